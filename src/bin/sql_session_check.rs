//! Open a session from a settings section, run one query and check the answer.
//!
//! ```text
//! sql-session-check --config settings.json --section reporting \
//!     --query "SELECT count(*) AS n FROM jobs" --field n --expect 0
//! ```
//!
//! Exit status: 0 on success, 1 if `--expect` does not match, 2 on any error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{Level, debug, error};

use sql_session::prelude::*;
use sql_session::config::DEFAULT_CHARSET;

#[derive(Debug, Parser)]
#[command(name = "sql-session-check", version, about = "Run one query through a database session")]
struct Args {
    /// JSON settings file holding named sections.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Section of the settings file to use.
    #[arg(short, long, default_value = "database")]
    section: String,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Database name; for SQLite, the file path.
    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    charset: Option<String>,

    #[arg(short, long, default_value = "SELECT 1")]
    query: String,

    /// Column to report instead of the first one.
    #[arg(short, long)]
    field: Option<String>,

    /// Expected value, compared as text.
    #[arg(short, long)]
    expect: Option<String>,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "check failed");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

/// Printed with `--json`.
#[derive(Debug, Serialize)]
struct Report<'a> {
    query: &'a str,
    value: JsonValue,
    row: Option<JsonValue>,
    expected: Option<&'a str>,
    matched: bool,
}

fn load_config(args: &Args) -> Result<SessionConfig, SqlSessionError> {
    let overrides = [
        ("host", &args.host),
        ("user", &args.user),
        ("password", &args.password),
        ("database", &args.database),
        ("charset", &args.charset),
    ];

    let Some(path) = &args.config else {
        let database = args.database.clone().ok_or_else(|| {
            SqlSessionError::ConfigError("either --config or --database is required".to_owned())
        })?;
        let mut cfg = SessionConfig::new(
            args.host.as_deref().unwrap_or("localhost"),
            args.user.as_deref().unwrap_or("local"),
            args.password.as_deref().unwrap_or_default(),
            database,
        );
        cfg.charset = args.charset.as_deref().unwrap_or(DEFAULT_CHARSET).to_owned();
        cfg.validate()?;
        return Ok(cfg);
    };

    let mut resolver = ConfigResolver::for_database(args.section.as_str());
    for (key, value) in overrides {
        if let Some(value) = value {
            resolver = resolver.with_override(key, value.as_str());
        }
    }
    let cfg = SessionConfig::from_settings(&resolver.resolve_file(path)?)?;
    cfg.validate()?;
    Ok(cfg)
}

fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let cfg = load_config(args)?;
    debug!(config = ?cfg, "resolved configuration");

    let mut session = DatabaseSession::connect(SqliteDriver::new(), cfg)?;
    let row = session.fetch_row(&args.query)?;
    session.close();

    let value = match (&row, &args.field) {
        (Some(row), Some(field)) => match row.get(field) {
            Some(value) => Some(value.clone()),
            None => {
                return Err(format!(
                    "column `{field}` not in result ({})",
                    row.column_names.join(", ")
                )
                .into());
            }
        },
        (Some(row), None) => row.get_by_index(0).cloned(),
        (None, _) => None,
    };
    let text = value.as_ref().and_then(RowValues::to_plain_string);
    let matched = args
        .expect
        .as_ref()
        .is_none_or(|expected| text.as_deref() == Some(expected.as_str()));

    if args.json {
        let report = Report {
            query: &args.query,
            value: value.as_ref().map_or(JsonValue::Null, JsonValue::from),
            row: row.as_ref().map(Row::to_json),
            expected: args.expect.as_deref(),
            matched,
        };
        println!("{}", serde_json::to_string(&report)?);
    } else {
        match &text {
            Some(text) => println!("{text}"),
            None => println!("NULL"),
        }
        if !matched {
            eprintln!(
                "expected {:?}, got {:?}",
                args.expect.as_deref().unwrap_or_default(),
                text.as_deref().unwrap_or("NULL")
            );
        }
    }
    Ok(matched)
}
