//! Error taxonomy for the sync queue.
//!
//! Store-integrity failures (missing ids, sqlite errors) are programming or
//! environment errors and propagate to the caller. Submission failures are
//! recorded on the queue entry itself and never abort a drain.

use thiserror::Error;

use crate::pedido::SyncStatus;

/// Errors raised by the durable queue store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pedido {0} não encontrado na fila de sincronização")]
    NotFound(i64),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Another thread panicked while holding the connection lock.
    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("payload do pedido {id} ilegível: {source}")]
    MalformedPayload {
        id: i64,
        source: serde_json::Error,
    },

    /// The patch would leave the entry violating a store invariant
    /// (SUCESSO without a NUNOTA, ERRO without a message).
    #[error("patch inválido para o pedido {id}: {reason}")]
    InvalidPatch { id: i64, reason: &'static str },
}

/// Failure of a single delivery attempt against the order-entry backend.
///
/// The message is what the monitor shows next to the entry, so it is written
/// for end users rather than for logs.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Could not reach the backend (DNS, connect, timeout).
    #[error("{0}")]
    Transport(String),

    /// Backend answered with a non-success status.
    #[error("{0}")]
    Backend(String),

    /// Backend answered 2xx but the body did not contain a NUNOTA.
    #[error("resposta inválida do servidor de pedidos: {0}")]
    MalformedResponse(String),
}

/// Errors raised by the sync engine and monitor actions.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// `retry_one` is only legal from ERRO.
    #[error("pedido {id} não está em ERRO (status atual: {status})")]
    InvalidState { id: i64, status: SyncStatus },

    /// Sync actions are gated on connectivity.
    #[error("sem conexão com a internet")]
    Offline,
}
