//! Session-layer configuration.

use std::time::Duration;

use parley_types::{CHUM_IDLE_TIMEOUT, HANDSHAKE_TIMEOUT};

/// Configuration for sessions and transports.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Wall-clock budget for each handshake step. A step that blocks
    /// longer closes the transport.
    pub handshake_timeout: Duration,
    /// Idle interval after which a sync session sends a heartbeat. A peer
    /// silent for twice this long is considered lost.
    pub idle_timeout: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self { handshake_timeout: HANDSHAKE_TIMEOUT, idle_timeout: CHUM_IDLE_TIMEOUT }
    }
}

impl NetConfig {
    /// Override the handshake budget.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Override the idle interval.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}
