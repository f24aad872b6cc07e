// SQLite driver - the default `Driver` implementation, backed by rusqlite
//
// This module is split into several sub-modules:
// - config: driver options and connection opening
// - connection: the `DriverConnection` primitives over one rusqlite connection
// - params: bind type to SQLite value conversion
// - prepared: prepared statement binding and execution
// - multi: cursor over a multi-statement batch
// - query: result extraction and building

pub mod config;
pub mod connection;
pub mod multi;
pub mod params;
pub mod prepared;
pub mod query;

// Re-export the public API
pub use config::SqliteDriver;
pub use connection::SqliteHandle;
pub use params::bound_value;
pub use query::build_result_set;
