//! Configuration management for corbel applications
//!
//! Values are gathered into a single [`ConfigManager`] from, in increasing
//! order of precedence: configuration files (TOML or JSON), a `.env` file,
//! and `CORBEL_`-prefixed environment variables. [`AppConfig`] reads the
//! handful of settings the framework itself needs.
//!
//! ```
//! use corbel_config::{ConfigManager, FileFormat};
//!
//! let config = ConfigManager::new();
//! config.load_str("port = 8080\n[db]\nurl = \"postgres://localhost\"", FileFormat::Toml).unwrap();
//!
//! let port: u16 = config.get("port").unwrap();
//! assert_eq!(port, 8080);
//! assert_eq!(config.get_string("db.url").unwrap(), "postgres://localhost");
//! ```

pub mod app_config;
pub mod env;
pub mod error;
pub mod loader;

pub use app_config::{AppConfig, Environment};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Prefix for environment variables read by [`ConfigManager::load_env`].
pub const ENV_PREFIX: &str = "CORBEL";

/// Main configuration manager
///
/// Cloning is cheap and clones share the same table.
#[derive(Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, Value>>>,
    env: EnvLoader,
}

impl ConfigManager {
    /// Manager reading `CORBEL_*` environment variables
    pub fn new() -> Self {
        Self::with_prefix(ENV_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::new(RwLock::new(HashMap::new())),
            env: EnvLoader::new(Some(prefix.into())),
        }
    }

    /// Load prefixed variables from the process environment
    pub fn load_env(&self) -> Result<()> {
        self.insert_strings(self.env.load());
        Ok(())
    }

    /// Load prefixed entries from a `.env` file
    ///
    /// The file is read directly; the process environment is left untouched.
    /// With no path, `./.env` is used if it exists.
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match dotenvy::dotenv_iter() {
                Ok(iter) => return self.apply_dotenv(iter),
                Err(e) if e.not_found() => return Ok(()),
                Err(e) => return Err(ConfigError::Load(e.to_string())),
            },
        };

        let iter = dotenvy::from_path_iter(&path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        self.apply_dotenv(iter)
    }

    fn apply_dotenv<R: std::io::Read>(&self, iter: dotenvy::Iter<R>) -> Result<()> {
        let vars = iter
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Parse(format!(".env parse error: {}", e)))?;
        self.insert_strings(self.env.collect(vars));
        Ok(())
    }

    /// Load a TOML or JSON file, chosen by extension
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        self.config.write().extend(data);
        Ok(())
    }

    pub fn load_str(&self, content: &str, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).parse(content)?;
        self.config.write().extend(data);
        Ok(())
    }

    fn insert_strings(&self, vars: HashMap<String, String>) {
        let mut config = self.config.write();
        for (key, value) in vars {
            config.insert(key, Value::String(value));
        }
    }

    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| ConfigError::invalid(key, e.to_string()))?;
        self.config.write().insert(key.to_string(), value);
        Ok(())
    }

    /// Get a typed value
    ///
    /// Values that came from the environment are strings; when the string
    /// does not deserialize as `T` directly it is read as JSON, so `"8080"`
    /// satisfies a `u16` and `"true"` a `bool`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .config
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => Ok(typed),
            Err(err) => match &value {
                Value::String(raw) => serde_json::from_str::<T>(raw)
                    .map_err(|_| ConfigError::invalid(key, err.to_string())),
                _ => Err(ConfigError::invalid(key, err.to_string())),
            },
        }
    }

    /// Get a typed value, or `None` when the key is absent
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.config.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.config.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy every entry of `other` over this manager's entries
    pub fn merge(&self, other: &ConfigManager) {
        if Arc::ptr_eq(&self.config, &other.config) {
            return;
        }
        let entries = other.config.read().clone();
        self.config.write().extend(entries);
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("keys", &self.keys())
            .field("env", &self.env)
            .finish()
    }
}
