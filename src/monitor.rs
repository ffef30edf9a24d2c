//! Queue projection for the sync monitor screen.
//!
//! Read-only aggregation (summary cards, display rows) plus the user
//! actions the screen exposes: refresh, sync-now, retry-one, purge-synced
//! and the confirm-gated removal flow. Nothing here mutates entries except
//! through the engine and store operations.

use serde::Serialize;
use tracing::info;

use crate::api::PedidoSubmitter;
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::db::DbState;
use crate::error::{StoreError, SyncError};
use crate::pedido::{Ambiente, PedidoSync, SyncStatus};
use crate::store::{self, StatusCounts};
use crate::sync::{self, SyncReport, SyncState};

/// Summary cards: total / pendentes / sucesso / erros.
pub fn summary(db: &DbState) -> Result<StatusCounts, StoreError> {
    store::counts(db)
}

/// One rendered table row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PedidoRow {
    pub id: i64,
    /// Relative capture time, pt-BR ("há 5 minutos").
    pub capturado: String,
    pub cliente: String,
    pub cpf_cnpj: String,
    pub qtd_itens: usize,
    /// Formatted total, "R$ 123.45".
    pub valor: String,
    pub ambiente: Ambiente,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nunota: Option<i64>,
    pub tentativas: i64,
}

/// Load display rows, newest capture first.
pub fn load_rows(db: &DbState) -> Result<Vec<PedidoRow>, StoreError> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut entries = store::list_all(db)?;
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(entries.iter().map(|e| to_row(e, now_ms)).collect())
}

fn to_row(entry: &PedidoSync, now_ms: i64) -> PedidoRow {
    PedidoRow {
        id: entry.id,
        capturado: tempo_relativo(entry.created_at, now_ms),
        cliente: entry.payload.razao_social.clone(),
        cpf_cnpj: entry.payload.cpf_cnpj.clone(),
        qtd_itens: entry.payload.itens.len(),
        valor: format_valor(entry.payload.vlrnota),
        ambiente: entry.ambiente,
        status: entry.status,
        erro: entry.erro.clone(),
        nunota: entry.nunota_gerado,
        tentativas: entry.tentativas,
    }
}

/// "R$ 123.45", two decimal places.
fn format_valor(valor: f64) -> String {
    format!("R$ {valor:.2}")
}

/// Relative pt-BR rendering of a capture timestamp.
fn tempo_relativo(created_at_ms: i64, now_ms: i64) -> String {
    let delta_s = (now_ms - created_at_ms).max(0) / 1000;
    match delta_s {
        0..=59 => "agora mesmo".to_string(),
        60..=3_599 => {
            let minutos = delta_s / 60;
            if minutos == 1 {
                "há 1 minuto".to_string()
            } else {
                format!("há {minutos} minutos")
            }
        }
        3_600..=86_399 => {
            let horas = delta_s / 3_600;
            if horas == 1 {
                "há 1 hora".to_string()
            } else {
                format!("há {horas} horas")
            }
        }
        _ => {
            let dias = delta_s / 86_400;
            if dias == 1 {
                "há 1 dia".to_string()
            } else {
                format!("há {dias} dias")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// "Sincronizar Agora": drains the queue, gated on connectivity.
pub async fn sync_now<S: PedidoSubmitter>(
    db: &DbState,
    state: &SyncState,
    connectivity: &Connectivity,
    submitter: &S,
    config: &SyncConfig,
) -> Result<SyncReport, SyncError> {
    if !connectivity.is_online() {
        return Err(SyncError::Offline);
    }
    sync::process_queue(db, state, submitter, config.max_tentativas).await
}

/// Retry button on an ERRO row. Re-arms only; the caller usually follows
/// with `sync_now` or waits for the next drain.
pub fn retry(db: &DbState, id: i64) -> Result<(), SyncError> {
    sync::retry_one(db, id)
}

/// "Limpar Sincronizados": removes every SUCESSO entry.
pub fn purge_synced(db: &DbState) -> Result<usize, StoreError> {
    let removed = store::delete_synced(db)?;
    if removed > 0 {
        info!(removed, "Synced pedidos purged from queue");
    }
    Ok(removed)
}

/// Pending removal ticket. [`request_remove`] hands one out after checking
/// the entry exists; the store delete only fires on [`confirm`]. Dropping
/// the ticket (or calling [`cancel`]) leaves the entry untouched.
///
/// [`confirm`]: RemovalTicket::confirm
/// [`cancel`]: RemovalTicket::cancel
#[derive(Debug)]
#[must_use = "a removal ticket does nothing until confirmed"]
pub struct RemovalTicket {
    id: i64,
}

impl RemovalTicket {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn confirm(self, db: &DbState) -> Result<(), StoreError> {
        store::delete(db, self.id)?;
        info!(pedido_id = self.id, "Pedido removal confirmed");
        Ok(())
    }

    pub fn cancel(self) {
        info!(pedido_id = self.id, "Pedido removal cancelled");
    }
}

/// First step of the removal flow: validates the id and returns the
/// confirmation ticket the dialog holds on to.
pub fn request_remove(db: &DbState, id: i64) -> Result<RemovalTicket, StoreError> {
    store::get(db, id)?;
    Ok(RemovalTicket { id })
}
