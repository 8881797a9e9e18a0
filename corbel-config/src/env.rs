// Environment variable loading

use std::collections::HashMap;
use std::env;

/// Reads prefixed environment variables into lowercase configuration keys.
///
/// With prefix `CORBEL`, `CORBEL_LOG_LEVEL=debug` becomes `log_level = "debug"`.
/// Variables without the prefix are ignored.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.map(|p| p.trim_end_matches('_').to_uppercase()),
        }
    }

    /// Load from the process environment.
    pub fn load(&self) -> HashMap<String, String> {
        self.collect(env::vars())
    }

    /// Load from `.env` style `(key, value)` pairs.
    pub fn collect<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| self.config_key(&key).map(|key| (key, value)))
            .collect()
    }

    /// Map an environment variable name to its configuration key.
    pub fn config_key(&self, var: &str) -> Option<String> {
        match &self.prefix {
            Some(prefix) => var
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .filter(|rest| !rest.is_empty())
                .map(str::to_lowercase),
            None => Some(var.to_lowercase()),
        }
    }

    /// Name of the environment variable backing `key`.
    pub fn var_name(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }

    pub fn load_var(&self, key: &str) -> Option<String> {
        env::var(self.var_name(key)).ok()
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // std::env::set_var is unsafe in edition 2024, so these tests feed
    // variables through `collect` instead of the process environment.

    fn pairs(vars: &[(&str, &str)]) -> Vec<(String, String)> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_prefix_is_stripped_and_lowercased() {
        let loader = EnvLoader::new(Some("CORBEL".to_string()));
        let config = loader.collect(pairs(&[
            ("CORBEL_PORT", "8080"),
            ("CORBEL_LOG_LEVEL", "debug"),
            ("HOME", "/root"),
            ("CORBELLA", "ignored"),
        ]));

        assert_eq!(config.len(), 2);
        assert_eq!(config["port"], "8080");
        assert_eq!(config["log_level"], "debug");
    }

    #[test]
    fn test_trailing_underscore_in_prefix() {
        let loader = EnvLoader::new(Some("corbel_".to_string()));
        assert_eq!(loader.config_key("CORBEL_HOST").as_deref(), Some("host"));
        assert_eq!(loader.config_key("CORBEL_"), None);
        assert_eq!(loader.var_name("host"), "CORBEL_HOST");
    }

    #[test]
    fn test_no_prefix_keeps_everything() {
        let loader = EnvLoader::default();
        let config = loader.collect(pairs(&[("PATH", "/bin")]));
        assert_eq!(config["path"], "/bin");
    }

    #[test]
    fn test_missing_var_uses_default() {
        let loader = EnvLoader::new(Some("CORBEL_TEST".to_string()));
        assert!(loader.load_var("MISSING_VAR_67890").is_none());
        assert_eq!(loader.load_var_or("MISSING_VAR_67890", "fallback"), "fallback");
    }
}
