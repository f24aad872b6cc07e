#![cfg(feature = "test-utils")]
use sql_session::test_utils::mock_driver::{CONNECT_REFUSED, GONE_AWAY};
use sql_session::test_utils::{MockDriver, memory_config};
use sql_session::{DatabaseSession, IdlePolicy, LivenessState, RowValues, SqlSessionError};
use std::thread::sleep;
use std::time::Duration;

fn open(
    driver: &MockDriver,
    policy: IdlePolicy,
) -> Result<DatabaseSession<MockDriver>, SqlSessionError> {
    let mut cfg = memory_config();
    cfg.idle_policy = policy;
    DatabaseSession::connect(driver.clone(), cfg)
}

#[test]
fn connect_negotiates_charset_and_reads_idle_threshold() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let session = open(&driver, IdlePolicy::default())?;

    let stats = driver.stats();
    assert_eq!(stats.connects, 1);
    assert_eq!(stats.charset_calls, 1);
    assert_eq!(stats.introspections, 1);
    assert_eq!(stats.probes, 0);
    // Half of the reported eight hours.
    assert_eq!(session.idle_budget(), Duration::from_secs(14_400));
    Ok(())
}

#[test]
fn fresh_connection_is_not_probed() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver, IdlePolicy::default())?;

    for _ in 0..5 {
        assert_eq!(session.fetch_one("SELECT 1")?, Some(RowValues::Int(1)));
    }
    let stats = driver.stats();
    assert_eq!(stats.probes, 0);
    assert_eq!(stats.executes, 5);
    assert_eq!(stats.connects, 1);
    Ok(())
}

#[test]
fn zero_budget_probes_before_every_call() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver, IdlePolicy::fixed(Duration::ZERO))?;
    assert_eq!(session.liveness_state(), LivenessState::Stale);

    for _ in 0..3 {
        session.fetch_one("SELECT 1")?;
    }
    assert_eq!(driver.stats().probes, 3);
    assert_eq!(driver.stats().connects, 1);
    Ok(())
}

#[test]
fn idle_past_budget_probes_once_then_trusts_again() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new().with_server_idle_timeout(Some(Duration::from_millis(500)));
    let mut session = open(&driver, IdlePolicy::default())?;
    assert_eq!(session.idle_budget(), Duration::from_millis(250));

    session.fetch_one("SELECT 1")?;
    assert_eq!(driver.stats().probes, 0);

    sleep(Duration::from_millis(300));
    assert_eq!(session.liveness_state(), LivenessState::Stale);
    session.fetch_one("SELECT 1")?;
    assert_eq!(driver.stats().probes, 1);

    session.fetch_one("SELECT 1")?;
    assert_eq!(driver.stats().probes, 1);
    Ok(())
}

#[test]
fn missing_server_threshold_uses_fallback() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new().with_server_idle_timeout(None);
    let session = open(
        &driver,
        IdlePolicy::default().with_fallback(Duration::from_secs(60)),
    )?;
    assert_eq!(session.idle_budget(), Duration::from_secs(30));

    let server_value = open(&driver, IdlePolicy::server_value())?;
    assert_eq!(server_value.idle_budget(), Duration::from_secs(60 * 5));
    Ok(())
}

#[test]
fn dead_connection_is_replaced_after_probe() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver, IdlePolicy::fixed(Duration::ZERO))?;
    session.fetch_one("SELECT 1")?;

    driver.kill_connections();
    assert_eq!(session.fetch_one("SELECT 7")?, Some(RowValues::Int(7)));

    let stats = driver.stats();
    assert_eq!(stats.connects, 2);
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.charset_calls, 2);
    assert_eq!(stats.probes, 2);
    assert!(session.is_connected());
    Ok(())
}

#[test]
fn trusted_connection_failure_surfaces_as_query_error() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver, IdlePolicy::default())?;

    driver.kill_connections();
    let err = session.fetch_one("SELECT 1").unwrap_err();
    assert!(matches!(err, SqlSessionError::QueryError { .. }));
    assert_eq!(err.driver_code(), Some(GONE_AWAY));

    session.reconnect()?;
    assert_eq!(session.fetch_one("SELECT 1")?, Some(RowValues::Int(1)));
    assert_eq!(driver.stats().connects, 2);
    Ok(())
}

#[test]
fn failed_reconnect_is_retried_on_next_call() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver, IdlePolicy::fixed(Duration::ZERO))?;

    driver.kill_connections();
    driver.set_fail_connect(true);
    let err = session.fetch_one("SELECT 1").unwrap_err();
    assert!(matches!(err, SqlSessionError::ConnectionError { op: "connect", .. }));
    assert_eq!(err.driver_code(), Some(CONNECT_REFUSED));
    assert!(!session.is_connected());
    assert_eq!(session.liveness_state(), LivenessState::Disconnected);

    driver.set_fail_connect(false);
    assert_eq!(session.fetch_one("SELECT 1")?, Some(RowValues::Int(1)));
    assert_eq!(driver.stats().connects, 3);
    Ok(())
}

#[test]
fn close_errors_are_swallowed() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver, IdlePolicy::default())?;
    driver.set_fail_close(true);

    session.reconnect()?;
    session.close();
    assert_eq!(driver.stats().closes, 2);
    assert!(session.is_closed());
    Ok(())
}

#[test]
fn drop_releases_connection() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    {
        let mut session = open(&driver, IdlePolicy::default())?;
        session.fetch_one("SELECT 1")?;
    }
    assert_eq!(driver.stats().closes, 1);
    Ok(())
}

#[test]
fn double_close_releases_once() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver, IdlePolicy::default())?;
    session.close();
    session.close();
    drop(session);
    assert_eq!(driver.stats().closes, 1);
    Ok(())
}
