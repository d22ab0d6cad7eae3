use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CHANNEL_AUDIT__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Channel ids sent to the metadata source per request.
    #[serde(default = "default_metadata_batch_size")]
    pub metadata_batch_size: usize,
    /// Maximum number of channel ids in the recommended export.
    #[serde(default = "default_export_limit")]
    pub export_limit: usize,
    /// Top up an under-sized recommended export from the fallback source.
    #[serde(default = "default_fallback_enabled")]
    pub fallback_enabled: bool,
}

// Default functions
fn default_node_id() -> String {
    "audit-01".to_string()
}
fn default_metadata_batch_size() -> usize {
    5000
}
fn default_export_limit() -> usize {
    1000
}
fn default_fallback_enabled() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metadata_batch_size: default_metadata_batch_size(),
            export_limit: default_export_limit(),
            fallback_enabled: default_fallback_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("CHANNEL_AUDIT")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), crate::AuditError> {
        if self.engine.metadata_batch_size == 0 {
            return Err(crate::AuditError::Config(
                "engine.metadata_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.metadata_batch_size, 5000);
        assert_eq!(config.engine.export_limit, 1000);
        assert!(config.engine.fallback_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = AppConfig::default();
        config.engine.metadata_batch_size = 0;
        assert!(config.validate().is_err());
    }
}
