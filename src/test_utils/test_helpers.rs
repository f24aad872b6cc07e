//! Helper utilities for testing and development.

use crate::config::SessionConfig;

/// Settings for a private in-memory SQLite database.
#[must_use]
pub fn memory_config() -> SessionConfig {
    SessionConfig::new("localhost", "test", "", ":memory:")
}
