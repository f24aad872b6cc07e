#![cfg(feature = "test-utils")]
use serde_json::json;
use sql_session::config::{ConfigResolver, KeySpec};
use sql_session::prelude::*;
use sql_session::test_utils::{MockDriver, memory_config};
use sql_session::{IdleBudget, validate};
use std::io::Write;
use std::time::Duration;

#[test]
fn section_with_aliases_and_overrides() -> Result<(), Box<dyn std::error::Error>> {
    let doc = json!({
        "reporting": {
            "hostname": "db.internal:3306",
            "username": "report",
            "pwd": "s3cret",
            "dbname": "warehouse",
            "idle_fraction": 0.25,
            "wait_timeout": 600
        }
    });
    let cfg = SessionConfig::from_section(&doc, "reporting", &[("database", "staging")])?;
    assert_eq!(cfg.host, "db.internal:3306");
    assert_eq!(cfg.user, "report");
    assert_eq!(cfg.password, "s3cret");
    assert_eq!(cfg.database, "staging");
    assert_eq!(cfg.charset, "utf8mb4");
    assert_eq!(cfg.idle_policy.budget, IdleBudget::Fraction(0.25));
    assert_eq!(cfg.idle_policy.fallback, Duration::from_secs(600));
    assert!(!format!("{cfg:?}").contains("s3cret"));
    Ok(())
}

#[test]
fn resolution_problems_are_all_reported() {
    let doc = json!({ "main": { "host": "bad host!", "database": "app" } });
    let err = ConfigResolver::for_database("main").resolve(&doc).unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, SqlSessionError::ConfigError(_)));
    assert!(message.contains("`host` failed validation"), "{message}");
    assert!(message.contains("missing required key `user`"), "{message}");

    let err = ConfigResolver::for_database("absent").resolve(&doc).unwrap_err();
    assert!(err.to_string().contains("section `absent` not found"));

    let err = ConfigResolver::for_database("main")
        .with_override("colour", "blue")
        .resolve(&doc)
        .unwrap_err();
    assert!(err.to_string().contains("unknown key `colour`"));
}

#[test]
fn custom_keys_and_files() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    let document = json!({
        "cache": { "host": "localhost", "user": "svc", "database": ":memory:", "region": "eu" }
    });
    file.write_all(document.to_string().as_bytes())?;

    let settings = ConfigResolver::for_database("cache")
        .key(KeySpec::required("region", &["zone"], validate::is_valid_user))
        .resolve_file(file.path())?;
    assert_eq!(settings.get("region"), Some("eu"));
    assert_eq!(settings.get("password"), None);

    let cfg = SessionConfig::from_settings(&settings)?;
    let mut session = DatabaseSession::connect(SqliteDriver::new(), cfg)?;
    assert_eq!(session.fetch_one("SELECT 'ok'")?, Some(RowValues::Text("ok".into())));
    Ok(())
}

#[test]
fn invalid_settings_never_reach_the_driver() {
    let driver = MockDriver::new();
    let mut cfg = memory_config();
    cfg.host = String::new();
    cfg.idle_policy = IdlePolicy::fraction(2.0);

    let err = DatabaseSession::connect(driver.clone(), cfg).unwrap_err();
    let SqlSessionError::ConfigError(message) = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(message.contains("host"));
    assert!(message.contains("idle policy"));
    assert_eq!(driver.stats().connects, 0);
}

#[test]
fn construction_fails_on_connect_or_charset() {
    let driver = MockDriver::new();
    driver.set_fail_connect(true);
    let err = DatabaseSession::connect(driver.clone(), memory_config()).unwrap_err();
    assert!(matches!(err, SqlSessionError::ConnectionError { op: "connect", .. }));

    driver.set_fail_connect(false);
    driver.set_fail_charset(true);
    let err = DatabaseSession::connect(driver.clone(), memory_config()).unwrap_err();
    assert!(matches!(err, SqlSessionError::ConnectionError { op: "set charset", .. }));
    assert_eq!(err.driver_code(), Some(1115));
    // The half-open connection is released.
    assert_eq!(driver.stats().closes, 1);
}

#[test]
fn reconfigure_switches_database() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let first = dir.path().join("first.db");
    let second = dir.path().join("second.db");

    let mut session = SessionConfig::builder("localhost", "svc", "", first.to_string_lossy())
        .connect(SqliteDriver::new())?;
    session.query("CREATE TABLE marker (name TEXT)")?;
    session.query("INSERT INTO marker VALUES ('first')")?;

    let mut cfg = session.config().clone();
    cfg.user = "bad user\n".into();
    assert!(matches!(session.reconfigure(cfg), Err(SqlSessionError::ConfigError(_))));
    assert_eq!(session.config().user, "svc");

    let mut cfg = session.config().clone();
    cfg.database = second.to_string_lossy().into_owned();
    session.reconfigure(cfg)?;
    assert!(session.fetch_all("SELECT name FROM marker").is_err());
    Ok(())
}
