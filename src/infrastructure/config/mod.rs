//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;

use crate::domain::models::CoreConfig;

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `.foreman/config.yaml` (project config)
    /// 3. `.foreman/local.yaml` (project local overrides, optional)
    /// 4. Environment variables (`FOREMAN_*` prefix, highest priority)
    pub fn load() -> Result<CoreConfig> {
        let config: CoreConfig = Figment::new()
            .merge(Serialized::defaults(CoreConfig::default()))
            .merge(Yaml::file(".foreman/config.yaml"))
            .merge(Yaml::file(".foreman/local.yaml"))
            .merge(Env::prefixed("FOREMAN_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<CoreConfig> {
        let config: CoreConfig = Figment::new()
            .merge(Serialized::defaults(CoreConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &CoreConfig) -> Result<()> {
        if config.scheduler.max_parallel == 0 || config.scheduler.max_parallel > 100 {
            anyhow::bail!(
                "Invalid max_parallel: {}. Must be between 1 and 100",
                config.scheduler.max_parallel
            );
        }
        if config.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if config.database.max_connections == 0 {
            anyhow::bail!("max_connections must be at least 1");
        }
        let weight_sum = config.priority_weights.sum();
        if (weight_sum - 1.0).abs() > 1e-9 {
            anyhow::bail!("Priority weights must sum to 1.0, got {weight_sum}");
        }
        if !config.policies.entries.contains_key("default") {
            anyhow::bail!("Policy table must define a 'default' entry");
        }
        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "Invalid log level: {other}. Must be one of: trace, debug, info, warn, error"
            ),
        }
        match config.logging.format.as_str() {
            "json" | "pretty" => {}
            other => anyhow::bail!("Invalid log format: {other}. Must be one of: json, pretty"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_validation() {
        let config = CoreConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_bad_max_parallel_rejected() {
        let mut config = CoreConfig::default();
        config.scheduler.max_parallel = 0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_missing_default_policy_rejected() {
        let mut config = CoreConfig::default();
        config.policies.entries.remove("default");
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_load_from_yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "scheduler:\n  max_parallel: 7\nlogging:\n  level: debug\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.scheduler.max_parallel, 7);
        assert_eq!(config.logging.level, "debug");
        // Untouched sections keep their defaults
        assert_eq!(config.scheduler.default_max_retries, 3);
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let mut config = CoreConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(ConfigLoader::validate(&config).is_err());
    }
}
