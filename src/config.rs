//! Runtime configuration read from the environment
//!
//! - `COMPSPEC_LOG`: minimum log level (`debug`, `info`, `warn`, `error`); unset disables logging
//! - `COMPSPEC_LOG_FILE`: append log lines to this file as well
//! - `COMPSPEC_LOG_FORMAT`: `json` (default) or `text`
//! - `COMPSPEC_POSIX_FLAGS`: bind flags to a POSIX-only flag set

use std::collections::HashMap;
use std::path::PathBuf;

use crate::flag::Capabilities;
use crate::structured_log::{LogConfig, LogLevel};

pub const ENV_LOG: &str = "COMPSPEC_LOG";
pub const ENV_LOG_FILE: &str = "COMPSPEC_LOG_FILE";
pub const ENV_LOG_FORMAT: &str = "COMPSPEC_LOG_FORMAT";
pub const ENV_POSIX_FLAGS: &str = "COMPSPEC_POSIX_FLAGS";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log: LogConfig,
    /// Flag-set features available when binding parsed flags
    pub capabilities: Capabilities,
    /// Name used to resolve `$<program>.macro` calls to the custom namespace
    pub program: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            capabilities: Capabilities::extended(),
            program: program_name(),
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars().collect())
    }

    /// Read configuration from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        let mut config = Config::default();

        if let Some(level) = vars.get(ENV_LOG).and_then(|l| LogLevel::parse(l)) {
            config.log.enabled = true;
            config.log.min_level = level;
        }
        if let Some(path) = vars.get(ENV_LOG_FILE).filter(|p| !p.is_empty()) {
            config.log.file_path = Some(PathBuf::from(path));
        }
        if let Some(format) = vars.get(ENV_LOG_FORMAT) {
            config.log.json_output = !format.eq_ignore_ascii_case("text");
        }
        if vars
            .get(ENV_POSIX_FLAGS)
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
        {
            config.capabilities = Capabilities::posix();
        }

        config
    }
}

/// File stem of the running executable
pub fn program_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| "compspec".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_disable_logging() {
        let config = Config::from_vars(HashMap::new());
        assert!(!config.log.enabled);
        assert_eq!(config.capabilities, Capabilities::extended());
    }

    #[test]
    fn test_log_settings() {
        let config = Config::from_vars(vars(&[
            (ENV_LOG, "debug"),
            (ENV_LOG_FORMAT, "TEXT"),
            (ENV_LOG_FILE, "/tmp/compspec.log"),
        ]));
        assert!(config.log.enabled);
        assert_eq!(config.log.min_level, LogLevel::Debug);
        assert!(!config.log.json_output);
        assert_eq!(config.log.file_path, Some(PathBuf::from("/tmp/compspec.log")));
    }

    #[test]
    fn test_posix_flags() {
        let config = Config::from_vars(vars(&[(ENV_POSIX_FLAGS, "1")]));
        assert_eq!(config.capabilities, Capabilities::posix());
    }
}
