//! pedido-sync — offline order synchronization queue for the sales dashboard.
//!
//! Orders captured while disconnected land in a durable SQLite queue as
//! `PENDENTE`. The sync engine drains them against the order-entry backend
//! (one bounded submission at a time), settling each entry to `SUCESSO`
//! with its generated NUNOTA or to `ERRO` with the failure message. The
//! monitor module projects the queue into the summary and table the
//! dashboard renders, and exposes the user actions: sync-now, retry,
//! confirm-gated removal and purge of synced entries.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod monitor;
pub mod pedido;
pub mod store;
pub mod sync;

pub use api::{PedidoApiClient, PedidoSubmitter};
pub use config::SyncConfig;
pub use connectivity::Connectivity;
pub use db::DbState;
pub use error::{StoreError, SubmitError, SyncError};
pub use pedido::{Ambiente, PedidoItem, PedidoPayload, PedidoSync, SyncStatus};
pub use store::{PedidoPatch, StatusCounts};
pub use sync::{SyncReport, SyncState};

/// Install the default tracing subscriber: `RUST_LOG` when set, otherwise
/// info-level with debug for this crate. Safe to call once per process.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pedido_sync=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}
