//! Harmony CLI library
//!
//! Configuration loading and command implementations behind the `harmony`
//! binary. Exposed as a library for testing.

pub mod commands;
pub mod config;
pub mod error;

pub use config::ConverterConfig;
pub use error::{CliError, Result};
