//! Core types and constants for the access point positioning engine

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
