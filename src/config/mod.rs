//! Configuration module for Quarry.
//!
//! Handles compiler settings files and environment variable expansion.

mod settings;

pub use settings::{expand_env_vars, CompilerSettings, SettingsError};
