//! TOML-based compiler settings.
//!
//! Supports a config file (quarry.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! dialect = "${QUARRY_DIALECT}"
//! parameterize = true
//! alias_prefix = "t"
//! pretty = false
//! identity_capture = true
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Compiler configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Target dialect name (duckdb, postgres, tsql, mysql). Supports
    /// `${ENV_VAR}` expansion.
    pub dialect: String,

    /// Bind constants as parameters instead of inlining them.
    pub parameterize: bool,

    /// Prefix of generated table aliases (`t0`, `t1`, ...).
    pub alias_prefix: String,

    /// Break clauses onto separate lines.
    pub pretty: bool,

    /// Read back generated keys on single-row INSERT.
    pub identity_capture: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            dialect: "duckdb".to_string(),
            parameterize: true,
            alias_prefix: "t".to_string(),
            pretty: true,
            identity_capture: true,
        }
    }
}

impl CompilerSettings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: CompilerSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `~/.config/quarry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUARRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("no quarry config found, using defaults");
        Ok(CompilerSettings::default())
    }

    /// The configured dialect with environment variables expanded.
    pub fn resolved_dialect(&self) -> Result<Dialect, SettingsError> {
        let name = expand_env_vars(&self.dialect)?;
        name.parse()
            .map_err(|_| SettingsError::UnsupportedDialect(name))
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let prefix = &self.alias_prefix;
        let valid = prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(SettingsError::InvalidConfig(format!(
                "alias_prefix '{}' must be a plain identifier",
                prefix
            )));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR ends at the first non-identifier character
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
