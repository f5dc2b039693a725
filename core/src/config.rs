//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::negotiator::MAX_REQUESTS;

/// Settings shared by every chain a client runs.
///
/// Deserializes from any serde format; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Physical requests allowed per chain.
    pub max_requests: u32,
    /// Resolve with 3xx responses instead of following them.
    pub disable_redirect: bool,
    /// Whole-operation timeout per physical request, in seconds.
    pub timeout: Option<u64>,
    pub user_agent: Option<String>,
    /// Accept any server certificate. Only for test servers.
    pub disable_tls_verification: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_requests: MAX_REQUESTS,
            disable_redirect: false,
            timeout: None,
            user_agent: None,
            disable_tls_verification: false,
        }
    }
}

impl ClientConfig {
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}
