//! Runtime configuration for the sync engine and submission client.

use std::env;
use std::time::Duration;

/// Repo-wide bound for outbound order submissions.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout used for the lightweight connectivity probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Automatic delivery attempts per entry before the drain starts skipping
/// it. Manual retry is always allowed past the cap.
pub const DEFAULT_MAX_TENTATIVAS: i64 = 5;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the order-entry backend, e.g. `https://pedidos.example.com`.
    pub backend_url: String,
    /// API token sent on every request.
    pub api_token: String,
    pub submit_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_tentativas: i64,
    /// When true, `Connectivity::notify_online` triggers a drain on
    /// reconnection. Off by default: the observed flow is manual-only.
    pub auto_sync_on_reconnect: bool,
}

impl SyncConfig {
    pub fn new(backend_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            api_token: api_token.into(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_tentativas: DEFAULT_MAX_TENTATIVAS,
            auto_sync_on_reconnect: false,
        }
    }

    /// Read configuration from `PEDIDO_SYNC_URL` / `PEDIDO_SYNC_TOKEN`,
    /// with optional overrides `PEDIDO_SYNC_MAX_TENTATIVAS` and
    /// `PEDIDO_SYNC_AUTO_RECONNECT`. Returns `None` when the URL is unset.
    pub fn from_env() -> Option<Self> {
        let backend_url = env::var("PEDIDO_SYNC_URL").ok()?;
        let api_token = env::var("PEDIDO_SYNC_TOKEN").unwrap_or_default();

        let mut config = Self::new(backend_url, api_token);
        if let Some(cap) = env::var("PEDIDO_SYNC_MAX_TENTATIVAS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
        {
            config.max_tentativas = cap;
        }
        if let Ok(flag) = env::var("PEDIDO_SYNC_AUTO_RECONNECT") {
            config.auto_sync_on_reconnect = matches!(flag.trim(), "1" | "true" | "on");
        }
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::new("https://pedidos.example.com", "tok");
        assert_eq!(config.submit_timeout, Duration::from_secs(15));
        assert_eq!(config.max_tentativas, 5);
        assert!(!config.auto_sync_on_reconnect);
    }
}
