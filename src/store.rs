//! Durable queue store: CRUD over `pedidos_sync`.
//!
//! All mutations commit immediately (autocommit + WAL), so a reload never
//! loses state beyond the last completed operation. Invariant coupling
//! lives here and nowhere else: callers cannot set `synced`, `erro` or
//! `nunota_gerado` independently of `status`, which is what keeps
//! `synced == 1 ⇔ status == SUCESSO` true after every mutation.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::MutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::error::StoreError;
use crate::pedido::{Ambiente, PedidoPayload, PedidoSync, SyncStatus};

const ENTRY_COLUMNS: &str = "id, payload, ambiente, status, synced, tentativas, erro, \
     nunota_gerado, idempotency_key, created_at";

/// Partial update applied by [`update`]. Fields that stay `None` are left
/// untouched. `erro` only lands when the patch moves the entry to ERRO, and
/// `nunota_gerado` only when it moves to SUCESSO; any other combination is
/// dropped so the store invariants hold no matter what the caller passes.
#[derive(Debug, Default, Clone)]
pub struct PedidoPatch {
    pub status: Option<SyncStatus>,
    pub erro: Option<String>,
    pub nunota_gerado: Option<i64>,
    pub increment_tentativas: bool,
}

impl PedidoPatch {
    pub fn status(status: SyncStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn sucesso(nunota: i64) -> Self {
        Self {
            status: Some(SyncStatus::Sucesso),
            nunota_gerado: Some(nunota),
            ..Self::default()
        }
    }

    pub fn erro(mensagem: impl Into<String>) -> Self {
        Self {
            status: Some(SyncStatus::Erro),
            erro: Some(mensagem.into()),
            ..Self::default()
        }
    }

    pub fn with_attempt(mut self) -> Self {
        self.increment_tentativas = true;
        self
    }
}

/// Counts by status, for the monitor summary cards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub total: usize,
    /// Everything not yet delivered: PENDENTE, SINCRONIZANDO and ERRO.
    pub pendentes: usize,
    pub sucesso: usize,
    pub erros: usize,
}

fn lock(db: &DbState) -> Result<MutexGuard<'_, Connection>, StoreError> {
    db.conn.lock().map_err(|_| StoreError::LockPoisoned)
}

type RawEntry = (
    i64,
    String,
    String,
    String,
    i64,
    i64,
    Option<String>,
    Option<i64>,
    String,
    i64,
);

fn map_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn build_entry(raw: RawEntry) -> Result<PedidoSync, StoreError> {
    let (id, payload_json, ambiente, status, synced, tentativas, erro, nunota, idem, created_at) =
        raw;

    let payload: PedidoPayload = serde_json::from_str(&payload_json)
        .map_err(|source| StoreError::MalformedPayload { id, source })?;

    Ok(PedidoSync {
        id,
        payload,
        ambiente: Ambiente::parse(&ambiente).unwrap_or(Ambiente::Offline),
        status: SyncStatus::parse(&status).unwrap_or(SyncStatus::Pendente),
        synced: synced != 0,
        tentativas,
        erro,
        nunota_gerado: nunota,
        idempotency_key: idem,
        created_at,
    })
}

/// Persist a freshly captured order. Returns the assigned id.
///
/// The entry starts as PENDENTE with zero attempts; `created_at` is the
/// capture instant in epoch millis.
pub fn insert(
    db: &DbState,
    payload: &PedidoPayload,
    ambiente: Ambiente,
) -> Result<i64, StoreError> {
    let payload_json = serde_json::to_string(payload)
        .map_err(|source| StoreError::MalformedPayload { id: 0, source })?;
    let created_at = Utc::now().timestamp_millis();
    let idempotency_key = Uuid::new_v4().to_string();

    let conn = lock(db)?;
    conn.execute(
        "INSERT INTO pedidos_sync (payload, ambiente, status, synced, tentativas, idempotency_key, created_at)
         VALUES (?1, ?2, 'PENDENTE', 0, 0, ?3, ?4)",
        params![payload_json, ambiente.as_str(), idempotency_key, created_at],
    )?;
    let id = conn.last_insert_rowid();

    debug!(pedido_id = id, ambiente = %ambiente, "Pedido enqueued for sync");
    Ok(id)
}

/// Load one entry. `NotFound` if the id is absent; `MalformedPayload` if
/// the stored JSON no longer parses.
pub fn get(db: &DbState, id: i64) -> Result<PedidoSync, StoreError> {
    let conn = lock(db)?;
    let raw = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM pedidos_sync WHERE id = ?1"),
            params![id],
            map_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))?;
    build_entry(raw)
}

/// All entries not yet delivered (`synced == 0`), oldest capture first.
pub fn list_pending(db: &DbState) -> Result<Vec<PedidoSync>, StoreError> {
    list_where(db, "WHERE synced = 0")
}

/// Every entry, oldest capture first. The monitor reverses for display.
pub fn list_all(db: &DbState) -> Result<Vec<PedidoSync>, StoreError> {
    list_where(db, "")
}

fn list_where(db: &DbState, where_clause: &str) -> Result<Vec<PedidoSync>, StoreError> {
    let conn = lock(db)?;
    let query = format!(
        "SELECT {ENTRY_COLUMNS} FROM pedidos_sync {where_clause} ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map([], map_row)?;

    let mut entries = Vec::new();
    for row in rows {
        match row.map_err(StoreError::from).and_then(build_entry) {
            Ok(entry) => entries.push(entry),
            // A single unreadable payload must not hide the rest of the queue.
            Err(e) => warn!("skipping unreadable pedido row: {e}"),
        }
    }
    Ok(entries)
}

/// Merge a patch into the entry at `id`.
///
/// Derived fields are recomputed here: `synced` follows `status`, `erro`
/// is cleared whenever the entry leaves ERRO, and `nunota_gerado` is
/// write-once (a second success cannot overwrite the first NUNOTA).
/// A patch that would settle the entry without its companion value —
/// SUCESSO with no NUNOTA in the patch or on the row, ERRO with no
/// message — is rejected with `InvalidPatch` before anything is written.
pub fn update(db: &DbState, id: i64, patch: &PedidoPatch) -> Result<(), StoreError> {
    let conn = lock(db)?;

    let raw = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM pedidos_sync WHERE id = ?1"),
            params![id],
            map_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))?;
    let (_, _, _, status_raw, _, tentativas, erro_atual, nunota_atual, _, _) = raw;
    let status_atual = SyncStatus::parse(&status_raw).unwrap_or(SyncStatus::Pendente);

    let status = patch.status.unwrap_or(status_atual);
    let synced = status == SyncStatus::Sucesso;
    let erro = if status == SyncStatus::Erro {
        patch.erro.clone().or(erro_atual)
    } else {
        None
    };
    let nunota = if nunota_atual.is_some() {
        nunota_atual
    } else if status == SyncStatus::Sucesso {
        patch.nunota_gerado
    } else {
        None
    };
    let tentativas = tentativas + i64::from(patch.increment_tentativas);

    if status == SyncStatus::Sucesso && nunota.is_none() {
        return Err(StoreError::InvalidPatch {
            id,
            reason: "SUCESSO exige NUNOTA",
        });
    }
    if status == SyncStatus::Erro && !erro.as_deref().is_some_and(|e| !e.is_empty()) {
        return Err(StoreError::InvalidPatch {
            id,
            reason: "ERRO exige mensagem",
        });
    }

    conn.execute(
        "UPDATE pedidos_sync
         SET status = ?1, synced = ?2, erro = ?3, nunota_gerado = ?4, tentativas = ?5
         WHERE id = ?6",
        params![
            status.as_str(),
            i64::from(synced),
            erro,
            nunota,
            tentativas,
            id
        ],
    )?;
    Ok(())
}

/// Remove one entry. Fails with `NotFound` when the id is absent: removal
/// is user-initiated, and a missing id means the caller's view is stale.
pub fn delete(db: &DbState, id: i64) -> Result<(), StoreError> {
    let conn = lock(db)?;
    let affected = conn.execute("DELETE FROM pedidos_sync WHERE id = ?1", params![id])?;
    if affected == 0 {
        return Err(StoreError::NotFound(id));
    }
    debug!(pedido_id = id, "Pedido removed from sync queue");
    Ok(())
}

/// Bulk-remove every entry in the given status. Returns how many rows
/// were removed; zero matches is not an error.
pub fn delete_where_status(db: &DbState, status: SyncStatus) -> Result<usize, StoreError> {
    let conn = lock(db)?;
    let removed = conn.execute(
        "DELETE FROM pedidos_sync WHERE status = ?1",
        params![status.as_str()],
    )?;
    Ok(removed)
}

/// Bulk-remove every successfully synced entry ("limpar sincronizados").
pub fn delete_synced(db: &DbState) -> Result<usize, StoreError> {
    delete_where_status(db, SyncStatus::Sucesso)
}

/// Counts for the monitor summary, computed in SQL.
pub fn counts(db: &DbState) -> Result<StatusCounts, StoreError> {
    let conn = lock(db)?;
    let (total, pendentes, sucesso, erros) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN synced = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'SUCESSO' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'ERRO' THEN 1 ELSE 0 END), 0)
         FROM pedidos_sync",
        [],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        },
    )?;

    Ok(StatusCounts {
        total: total as usize,
        pendentes: pendentes as usize,
        sucesso: sucesso as usize,
        erros: erros as usize,
    })
}
