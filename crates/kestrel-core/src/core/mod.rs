//! Engine configuration.

/// Configuration structures and loading
pub mod config;

pub use config::{load_config_or_default, Config};
