//! Connectivity monitor.
//!
//! Holds the process-local "online" flag the monitor uses to gate sync
//! actions. The flag is driven by host online/offline events via
//! [`Connectivity::set_online`] / [`Connectivity::set_offline`]; an active
//! HEAD probe against the backend health endpoint is available for hosts
//! without such events. Probe results are memoized through the bounded
//! cache so a busy monitor cannot hammer the endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

use crate::api::{self, PedidoSubmitter};
use crate::cache::BoundedCache;
use crate::config::SyncConfig;
use crate::db::DbState;
use crate::error::SyncError;
use crate::sync::{self, SyncReport, SyncState};

/// How long one probe result stays authoritative.
const PROBE_CACHE_TTL: Duration = Duration::from_secs(10);

pub struct Connectivity {
    online: AtomicBool,
    probe_cache: BoundedCache<String, bool>,
}

impl Connectivity {
    /// Starts optimistic (online) like the browser `navigator.onLine`
    /// default; the first probe or host event corrects it.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            probe_cache: BoundedCache::new(4, PROBE_CACHE_TTL),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Host reported connectivity loss. Sync actions are gated off until
    /// the next online transition.
    pub fn set_offline(&self) {
        if self.online.swap(false, Ordering::SeqCst) {
            info!("Connection lost; sync actions disabled");
        }
    }

    /// Host reported connectivity. Returns true on an offline→online
    /// transition so callers can decide to re-enable affordances.
    pub fn set_online(&self) -> bool {
        let was_offline = !self.online.swap(true, Ordering::SeqCst);
        if was_offline {
            info!("Connection restored");
        }
        was_offline
    }

    /// Actively probe the backend health endpoint and update the flag.
    /// Results are cached for a few seconds per backend URL.
    pub async fn probe(&self, config: &SyncConfig) -> bool {
        let key = config.backend_url.clone();
        let online = match self.probe_cache.get(&key) {
            Some(cached) => cached,
            None => {
                let fresh = api::probe_health(&config.backend_url, config.probe_timeout).await;
                self.probe_cache.put(key, fresh);
                fresh
            }
        };

        if online {
            self.set_online();
        } else {
            self.set_offline();
        }
        online
    }

    /// Host came back online. When `auto_sync_on_reconnect` is set the
    /// pending queue is drained immediately; otherwise this only flips the
    /// flag (the observed product behavior: reconnect re-enables the
    /// manual "Sincronizar Agora" button, nothing more).
    pub async fn notify_online<S: PedidoSubmitter>(
        &self,
        db: &DbState,
        state: &SyncState,
        submitter: &S,
        config: &SyncConfig,
    ) -> Result<Option<SyncReport>, SyncError> {
        let transitioned = self.set_online();
        if !config.auto_sync_on_reconnect || !transitioned {
            return Ok(None);
        }

        info!("Reconnected with auto-sync enabled; draining queue");
        let report = sync::process_queue(db, state, submitter, config.max_tentativas).await?;
        Ok(Some(report))
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}
