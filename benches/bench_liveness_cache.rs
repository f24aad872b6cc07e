//! Criterion comparison of `fetch_one` with the liveness cache trusting the
//! connection versus a zero idle budget that probes before every call. The mock
//! driver runs statements on in-memory SQLite, so the gap is the cost of the probe
//! round trip plus the session's bookkeeping.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sql_session::test_utils::{MockDriver, memory_config};
use sql_session::{DatabaseSession, IdlePolicy};
use std::hint::black_box;
use std::time::Duration;

fn open(policy: IdlePolicy) -> DatabaseSession<MockDriver> {
    let mut cfg = memory_config();
    cfg.idle_policy = policy;
    DatabaseSession::connect(MockDriver::new(), cfg).expect("open mock session")
}

fn bench_fetch_one(c: &mut Criterion) {
    let mut group = c.benchmark_group("liveness_cache_fetch_one");
    let cases = [
        ("cached", IdlePolicy::default()),
        ("probe_every_call", IdlePolicy::fixed(Duration::ZERO)),
    ];
    for (name, policy) in cases {
        let mut session = open(policy);
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let value = session.fetch_one(black_box("SELECT 1")).expect("fetch_one");
                black_box(value);
            });
        });
        let stats = session.driver().stats();
        println!("{name}: {} probes, {} executes", stats.probes, stats.executes);
    }
    group.finish();
}

criterion_group!(benches, bench_fetch_one);
criterion_main!(benches);
