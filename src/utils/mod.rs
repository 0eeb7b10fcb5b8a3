//! Utility modules

pub mod config;

pub use config::{Bounds, ConfigError, EngineConfig};
