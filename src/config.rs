use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which backend supplies routes/services, and how to reach it. Business
/// config (the routes and services themselves) always comes from the
/// chosen backend, never from this file — this file only configures
/// infrastructure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "backend")]
pub enum StorageConfig {
    Memory,
    Etcd {
        #[serde(default)]
        endpoints: Vec<String>,
        #[serde(default = "default_key_prefix")]
        key_prefix: String,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

fn default_key_prefix() -> String {
    "/discobox".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadConfig {
    #[serde(default = "default_settling_delay_ms")]
    pub settling_delay_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            settling_delay_ms: default_settling_delay_ms(),
        }
    }
}

fn default_settling_delay_ms() -> u64 {
    10
}

impl ReloadConfig {
    pub fn settling_delay(&self) -> Duration {
        Duration::from_millis(self.settling_delay_ms)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            reload: ReloadConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from a file (if it exists), falling back to
    /// built-in defaults (an in-memory backend) for zero-config startup,
    /// then apply environment variable overrides for the etcd endpoint
    /// list — the one setting that is awkward to express in a committed
    /// config file per deployment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: RouterConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            RouterConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DISCOBOX_ETCD_ENDPOINTS") {
            if let StorageConfig::Etcd { endpoints, .. } = &mut self.storage {
                *endpoints = v.split(',').map(|s| s.trim().to_string()).collect();
            }
        }
        if let Ok(v) = std::env::var("DISCOBOX_RELOAD_SETTLING_DELAY_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.reload.settling_delay_ms = n;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if let StorageConfig::Etcd { endpoints, .. } = &self.storage {
            if endpoints.is_empty() {
                anyhow::bail!("etcd storage backend configured with no endpoints");
            }
        }
        Ok(())
    }
}
