// Framework-level settings read from a ConfigManager

use crate::{ConfigError, ConfigManager, Result};
use corbel_core::logging::{LogFormat, LogLevel};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(ConfigError::invalid(
                "environment",
                format!("expected development, production or test, got '{}'", other),
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings the framework reads at bootstrap.
///
/// | key           | env var              | default       |
/// |---------------|----------------------|---------------|
/// | `environment` | `CORBEL_ENVIRONMENT` | `development` |
/// | `host`        | `CORBEL_HOST`        | `0.0.0.0`     |
/// | `port`        | `CORBEL_PORT`        | `3000`        |
/// | `log_level`   | `CORBEL_LOG_LEVEL`   | `info`        |
/// | `log_format`  | `CORBEL_LOG_FORMAT`  | `json`        |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Read from `manager`, filling absent keys with defaults.
    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        let defaults = Self::default();

        let environment = match manager.get_opt::<String>("environment")? {
            Some(raw) => raw.parse()?,
            None => defaults.environment,
        };

        let host = manager
            .get_opt::<String>("host")?
            .unwrap_or(defaults.host);
        if host.trim().is_empty() {
            return Err(ConfigError::invalid("host", "must not be empty"));
        }

        let port = manager.get_opt::<u16>("port")?.unwrap_or(defaults.port);

        let log_level = match manager.get_opt::<String>("log_level")? {
            Some(raw) => LogLevel::from_str(&raw)
                .ok_or_else(|| ConfigError::invalid("log_level", format!("unknown level '{}'", raw)))?,
            None => defaults.log_level,
        };

        let log_format = match manager.get_opt::<String>("log_format")? {
            Some(raw) => LogFormat::from_str(&raw)
                .ok_or_else(|| ConfigError::invalid("log_format", format!("unknown format '{}'", raw)))?,
            None => defaults.log_format,
        };

        Ok(Self {
            environment,
            host,
            port,
            log_level,
            log_format,
        })
    }

    /// Load from an optional config file, then `./.env`, then `CORBEL_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let manager = ConfigManager::new();
        if let Some(path) = file {
            manager.load_file(path)?;
        }
        manager.load_dotenv(None)?;
        manager.load_env()?;
        Self::from_manager(&manager)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: LogLevel::Info,
            log_format: LogFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileFormat;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_manager(&ConfigManager::new()).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(!config.is_production());
        assert_eq!(config.address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_reads_env_style_strings() {
        let manager = ConfigManager::new();
        manager.set("environment", "prod").unwrap();
        manager.set("port", "8080").unwrap();
        manager.set("log_level", "DEBUG").unwrap();
        manager.set("log_format", "pretty").unwrap();

        let config = AppConfig::from_manager(&manager).unwrap();
        assert!(config.is_production());
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_reads_file_values() {
        let manager = ConfigManager::new();
        manager
            .load_str("environment = \"test\"\nhost = \"127.0.0.1\"\nport = 4000\n", FileFormat::Toml)
            .unwrap();

        let config = AppConfig::from_manager(&manager).unwrap();
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.address(), "127.0.0.1:4000");
    }

    #[test]
    fn test_rejects_bad_values() {
        let manager = ConfigManager::new();
        manager.set("environment", "staging").unwrap();
        assert!(matches!(
            AppConfig::from_manager(&manager),
            Err(ConfigError::Invalid { key, .. }) if key == "environment"
        ));

        let manager = ConfigManager::new();
        manager.set("port", "70000").unwrap();
        assert!(AppConfig::from_manager(&manager).is_err());

        let manager = ConfigManager::new();
        manager.set("log_level", "loud").unwrap();
        assert!(matches!(
            AppConfig::from_manager(&manager),
            Err(ConfigError::Invalid { key, .. }) if key == "log_level"
        ));
    }

    #[test]
    fn test_environment_round_trip() {
        for env in [Environment::Development, Environment::Production, Environment::Test] {
            assert_eq!(env.to_string().parse::<Environment>().unwrap(), env);
        }
    }
}
