//! Test support: a counting, fault-injecting driver and small helpers.
//!
//! Enabled with the `test-utils` feature.

pub mod mock_driver;
pub mod test_helpers;

pub use mock_driver::{MockDriver, MockStats};
pub use test_helpers::memory_config;
