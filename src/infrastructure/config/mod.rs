//! Layered configuration (spec §4.10).

mod loader;

pub use loader::{ConfigError, ConfigLoader, ExecutorConfig};
