//! CLI configuration loaded from TOML.

use std::path::{Path, PathBuf};

use parley_ops::{LlmSettings, NodeConfig};
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Identity configuration.
    pub identity: IdentityConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Network configuration.
    pub network: NetworkConfig,
    /// Model provider configuration.
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Registration email.
    pub email: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Device name.
    pub instance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory for the object log and keychain.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listener bind address.
    pub listen_addr: String,
    /// Externally reachable URL advertised in invitations.
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat-completions endpoint URL; absent disables analysis.
    pub endpoint: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Bearer token for the provider.
    pub api_key: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig { instance: "default".into(), ..Default::default() },
            storage: StorageConfig::default(),
            network: NetworkConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { listen_addr: "127.0.0.1:0".into(), endpoint_url: None }
    }
}

/// Platform data directory, e.g. `~/.local/share/parley` on Linux.
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "parley", "parley")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".parley"))
}

/// Platform config file path.
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("org", "parley", "parley")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("parley.toml"))
}

impl CliConfig {
    /// Load configuration, falling back to defaults when the file is
    /// absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Build the node configuration.
    pub fn node_config(&self) -> NodeConfig {
        let mut config = NodeConfig::new(&self.storage.data_dir)
            .with_instance_name(&self.identity.instance)
            .with_listener(&self.network.listen_addr);
        if let Some(url) = &self.network.endpoint_url {
            config = config.with_endpoint_url(url);
        }
        if let (Some(endpoint), Some(model)) = (&self.llm.endpoint, &self.llm.model) {
            config = config.with_llm(LlmSettings {
                endpoint: endpoint.clone(),
                model: model.clone(),
                api_key: self.llm.api_key.clone(),
            });
        }
        config
    }
}
