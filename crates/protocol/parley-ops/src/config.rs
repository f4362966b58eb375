//! Node configuration.

use std::path::PathBuf;
use std::time::Duration;

use parley_net::NetConfig;

/// Model-provider settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Model name.
    pub model: String,
    /// Bearer token, if the provider needs one.
    pub api_key: Option<String>,
}

/// Configuration for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory holding the object log, keychain, and indexes.
    pub data_dir: PathBuf,
    /// Device name for the Instance object.
    pub instance_name: String,
    /// Listener bind address, e.g. `127.0.0.1:0`.
    pub listen_addr: Option<String>,
    /// Externally reachable URL advertised in invitations; derived from
    /// the listener when absent.
    pub endpoint_url: Option<String>,
    /// Session-layer knobs.
    pub net: NetConfig,
    /// Model provider for analysis, absent to disable extraction.
    pub llm: Option<LlmSettings>,
}

impl NodeConfig {
    /// Configuration with defaults for a data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            instance_name: "default".into(),
            listen_addr: None,
            endpoint_url: None,
            net: NetConfig::default(),
            llm: None,
        }
    }

    /// Set the device name.
    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    /// Enable the session listener on an address.
    pub fn with_listener(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Advertise an external endpoint URL.
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Configure the model provider.
    pub fn with_llm(mut self, llm: LlmSettings) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Shorten session timeouts, mainly for tests.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.net = self.net.with_handshake_timeout(timeout);
        self
    }
}
