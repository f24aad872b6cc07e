#![cfg(feature = "test-utils")]
use sql_session::prelude::*;
use sql_session::test_utils::{MockDriver, memory_config};
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
struct Boom;

impl fmt::Display for Boom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("boom")
    }
}

impl std::error::Error for Boom {}

fn open(driver: &MockDriver) -> Result<DatabaseSession<MockDriver>, SqlSessionError> {
    let mut session = DatabaseSession::connect(driver.clone(), memory_config())?;
    session.query("CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)")?;
    Ok(session)
}

fn count(session: &mut DatabaseSession<MockDriver>) -> Result<Option<RowValues>, SqlSessionError> {
    session.fetch_one("SELECT count(*) FROM ledger")
}

#[test]
fn successful_work_is_committed() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver)?;

    let last = session.transaction(|tx| {
        tx.query("INSERT INTO ledger (amount) VALUES (10)")?;
        assert!(tx.in_transaction());
        tx.insert("INSERT INTO ledger (amount) VALUES (-4)")
    })?;
    assert_eq!(last, InsertId::Int(2));
    assert!(!session.in_transaction());
    assert_eq!(count(&mut session)?, Some(RowValues::Int(2)));

    let stats = driver.stats();
    assert_eq!((stats.begins, stats.commits, stats.rollbacks), (1, 1, 0));
    Ok(())
}

#[test]
fn failing_work_is_rolled_back_with_cause() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver)?;

    let err = session
        .transaction(|tx| {
            tx.query("INSERT INTO ledger (amount) VALUES (99)")?;
            Err::<(), _>(Box::new(Boom) as Box<dyn std::error::Error + Send + Sync>)
        })
        .unwrap_err();

    match &err {
        SqlSessionError::TransactionError { source, rollback_error } => {
            assert!(source.downcast_ref::<Boom>().is_some());
            assert!(rollback_error.is_none());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(count(&mut session)?, Some(RowValues::Int(0)));

    let stats = driver.stats();
    assert_eq!((stats.begins, stats.commits, stats.rollbacks), (1, 0, 1));
    Ok(())
}

#[test]
fn query_error_inside_work_is_the_source() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver)?;

    let err = session
        .transaction(|tx| {
            tx.query("INSERT INTO ledger (amount) VALUES (1)")?;
            tx.query("INSERT INTO ledger (amount) VALUES (NULL)")
        })
        .unwrap_err();

    let SqlSessionError::TransactionError { source, .. } = &err else {
        panic!("unexpected error: {err:?}");
    };
    let inner = source
        .downcast_ref::<SqlSessionError>()
        .ok_or("source should be a session error")?;
    assert_eq!(inner.query_stage(), Some(QueryStage::Query));
    assert_eq!(count(&mut session)?, Some(RowValues::Int(0)));
    Ok(())
}

#[test]
fn rollback_failure_is_attached() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver)?;
    driver.set_fail_rollback(true);

    let err = session
        .transaction(|_| Err::<(), _>(Boom))
        .unwrap_err();
    match &err {
        SqlSessionError::TransactionError { rollback_error, .. } => {
            assert_eq!(rollback_error.as_ref().and_then(|e| e.code), Some(1180));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!session.in_transaction());

    driver.set_fail_rollback(false);
    session.transaction(|tx| tx.query("INSERT INTO ledger (amount) VALUES (5)"))?;
    assert_eq!(count(&mut session)?, Some(RowValues::Int(1)));
    Ok(())
}

#[test]
fn nested_transaction_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut session = open(&driver)?;

    session.transaction(|tx| {
        let nested = tx.transaction(|_| Ok::<_, SqlSessionError>(()));
        let err = nested.expect_err("nested transaction must fail");
        assert_eq!(err.query_stage(), Some(QueryStage::Begin));
        assert!(tx.in_transaction());
        tx.query("INSERT INTO ledger (amount) VALUES (3)")
    })?;

    assert_eq!(count(&mut session)?, Some(RowValues::Int(1)));
    assert_eq!(driver.stats().begins, 1);
    Ok(())
}

#[test]
fn lost_connection_inside_transaction_is_not_replaced() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MockDriver::new();
    let mut cfg = memory_config();
    cfg.idle_policy = IdlePolicy::fixed(Duration::ZERO);
    let mut session = DatabaseSession::connect(driver.clone(), cfg)?;

    let err = session
        .transaction(|tx| {
            driver.kill_connections();
            tx.fetch_one("SELECT 1")
        })
        .unwrap_err();

    let SqlSessionError::TransactionError { source, rollback_error } = &err else {
        panic!("unexpected error: {err:?}");
    };
    let inner = source
        .downcast_ref::<SqlSessionError>()
        .ok_or("source should be a session error")?;
    assert!(matches!(inner, SqlSessionError::ConnectionError { .. }));
    assert!(rollback_error.is_some());
    assert_eq!(driver.stats().connects, 1);

    // Outside the transaction the next call reconnects.
    assert_eq!(session.fetch_one("SELECT 1")?, Some(RowValues::Int(1)));
    assert_eq!(driver.stats().connects, 2);
    Ok(())
}

#[test]
fn writes_after_lost_connection_stay_inside_the_transaction()
-> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let driver = MockDriver::new();
    let mut cfg = memory_config();
    cfg.database = dir.path().join("ledger.db").to_string_lossy().into_owned();
    cfg.idle_policy = IdlePolicy::fixed(Duration::ZERO);
    let mut session = DatabaseSession::connect(driver.clone(), cfg)?;
    session.query("CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)")?;

    let err = session
        .transaction(|tx| {
            tx.query("INSERT INTO ledger (amount) VALUES (1)")?;
            driver.kill_connections();
            let lost = tx.fetch_one("SELECT 1");
            assert!(matches!(lost, Err(SqlSessionError::ConnectionError { .. })));

            // Nothing may reopen the connection while the transaction is open.
            let second = tx.query("INSERT INTO ledger (amount) VALUES (2)");
            assert!(matches!(
                second,
                Err(SqlSessionError::ConnectionError { op: "ping", .. })
            ));
            assert!(matches!(
                tx.reconnect(),
                Err(SqlSessionError::ConnectionError { op: "reconnect", .. })
            ));
            assert!(tx.in_transaction());
            assert!(!tx.is_connected());
            Ok::<_, SqlSessionError>(())
        })
        .unwrap_err();

    assert!(matches!(err, SqlSessionError::TransactionError { .. }));
    assert!(!session.in_transaction());
    assert_eq!(driver.stats().connects, 1);

    assert!(session.fetch_column("SELECT amount FROM ledger")?.is_empty());
    assert_eq!(driver.stats().connects, 2);
    Ok(())
}
