//! Configuration loading

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::scoring::EngineConfig;

pub const CONFIG_ENV: &str = "CALLGUARD_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "callguard.toml";

impl EngineConfig {
    /// Load configuration from a TOML file; missing keys use defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// `$CALLGUARD_CONFIG`, else `./callguard.toml` if present, else defaults
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from_path(path);
        }

        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.exists() {
            Self::load_from_path(default)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.learning_threshold, 10);
        assert_eq!(config.max_few_shot_examples, 5);
        assert_eq!(config.min_relevance, 0.1);
        assert_eq!(config.pool_category_cap, 10);
        assert_eq!(config.backend.timeout_ms, 30_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callguard.toml");
        fs::write(
            &path,
            r#"
learning_threshold = 4
data_path = "/tmp/callguard/learning.json"

[backend]
url = "http://localhost:8080/score"
timeout_ms = 1500
"#,
        )
        .unwrap();

        let config = EngineConfig::load_from_path(&path).unwrap();
        assert_eq!(config.learning_threshold, 4);
        assert_eq!(config.backend.url, "http://localhost:8080/score");
        assert_eq!(config.backend.timeout_ms, 1500);
        assert_eq!(config.backend.api_key_env.as_deref(), Some("CALLGUARD_API_KEY"));
        assert_eq!(config.min_examples_for_pattern, 3);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "learning_threshold = \"ten\"").unwrap();
        assert!(EngineConfig::load_from_path(&path).is_err());
    }
}
