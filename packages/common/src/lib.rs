//! Shared infrastructure for the kubevault key tooling
//!
//! Currently this is the logging layer: `env_logger` initialisation and
//! helpers that log key operations without ever exposing secret material.

pub mod logging;

pub use logging::LoggingTransformer;
