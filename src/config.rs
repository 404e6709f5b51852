//! Configuration for the contract mock service.
//!
//! Names the consumer/provider pair, the listener settings and the
//! interactions making up the contract.

use crate::interaction::Interaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Main configuration for the contract mock service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockServiceConfig {
    /// Consumer side of the contract
    #[serde(default = "default_consumer")]
    pub consumer: String,

    /// Provider side of the contract
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Listener and logging settings
    #[serde(default)]
    pub settings: ServiceSettings,

    /// Interactions making up the contract
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

fn default_consumer() -> String {
    "consumer".to_string()
}

fn default_provider() -> String {
    "provider".to_string()
}

impl Default for MockServiceConfig {
    fn default() -> Self {
        Self {
            consumer: default_consumer(),
            provider: default_provider(),
            settings: ServiceSettings::default(),
            interactions: Vec::new(),
        }
    }
}

impl MockServiceConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Duplicate interaction keys are allowed (the later one wins when
    /// registered) but logged.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashMap::new();
        for (i, interaction) in self.interactions.iter().enumerate() {
            let template = interaction
                .validate()
                .map_err(|e| anyhow::anyhow!("Interaction {}: {}", i, e))?;
            let key = interaction.request.key(&template);
            if let Some(previous) = seen.insert(key.clone(), i) {
                warn!(
                    key = %key,
                    first = previous,
                    second = i,
                    "Duplicate interaction; the later definition replaces the earlier one"
                );
            }
        }
        Ok(())
    }
}

/// Listener and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSettings {
    /// Address to bind the mock listener to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on (0 = pick a free port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log requests matched to interactions
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests that matched nothing
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_matches: true,
            log_unmatched: true,
        }
    }
}

impl ServiceSettings {
    /// Settings for an ephemeral local listener, as used by tests.
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            ..Self::default()
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_true() -> bool {
    true
}
