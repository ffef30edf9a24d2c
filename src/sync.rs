//! Sync engine: drains the queue against the order-entry backend.
//!
//! State machine per entry: `PENDENTE → SINCRONIZANDO → {SUCESSO | ERRO}`,
//! with `ERRO → PENDENTE` via manual retry. One failed entry never aborts
//! the batch; only store-level failures do. At most one drain is in flight
//! per [`SyncState`] — a second trigger observes the flag and returns a
//! skipped report instead of racing the first.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::PedidoSubmitter;
use crate::db::DbState;
use crate::error::SyncError;
use crate::pedido::SyncStatus;
use crate::store::{self, PedidoPatch};

/// Shared engine state: the single-flight flag and the last completed
/// drain timestamp (RFC 3339, for the monitor header).
pub struct SyncState {
    in_flight: AtomicBool,
    last_sync: Mutex<Option<String>>,
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            last_sync: Mutex::new(None),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn last_sync(&self) -> Option<String> {
        self.last_sync.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the single-flight flag even when a store error unwinds the
/// drain early.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Outcome of one `process_queue` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub processados: usize,
    pub sucessos: usize,
    pub falhas: usize,
    /// Entries left alone because they hit the automatic attempt cap.
    pub pulados: usize,
    /// True when another drain was already running and this call did nothing.
    pub ja_em_andamento: bool,
}

/// Drain every unsynced entry, oldest capture first.
///
/// Each entry is marked SINCRONIZANDO with its attempt counter bumped
/// before the submission, then settled to SUCESSO (NUNOTA recorded, error
/// cleared) or ERRO (message recorded, still listed as pending). An ERRO
/// entry at or past `max_tentativas` is skipped — it waits for `retry_one`,
/// which re-arms it as PENDENTE, and a PENDENTE entry is always processed
/// (it is either fresh or deliberately re-armed by the operator).
pub async fn process_queue<S: PedidoSubmitter>(
    db: &DbState,
    state: &SyncState,
    submitter: &S,
    max_tentativas: i64,
) -> Result<SyncReport, SyncError> {
    if state
        .in_flight
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        debug!("Drain already in flight, skipping");
        return Ok(SyncReport {
            ja_em_andamento: true,
            ..SyncReport::default()
        });
    }
    let _guard = DrainGuard(&state.in_flight);

    let pendentes = store::list_pending(db)?;
    if pendentes.is_empty() {
        return Ok(SyncReport::default());
    }

    info!(pendentes = pendentes.len(), "Processing sync queue");
    let mut report = SyncReport::default();

    for entry in pendentes {
        if entry.status == SyncStatus::Erro && entry.tentativas >= max_tentativas {
            debug!(
                pedido_id = entry.id,
                tentativas = entry.tentativas,
                "Attempt cap reached, waiting for manual retry"
            );
            report.pulados += 1;
            continue;
        }

        store::update(
            db,
            entry.id,
            &PedidoPatch::status(SyncStatus::Sincronizando).with_attempt(),
        )?;
        report.processados += 1;

        match submitter.submit(&entry.payload, &entry.idempotency_key).await {
            Ok(nunota) => {
                store::update(db, entry.id, &PedidoPatch::sucesso(nunota))?;
                info!(pedido_id = entry.id, nunota, "Pedido synced");
                report.sucessos += 1;
            }
            Err(e) => {
                // Recorded on the entry; the batch moves on.
                let mensagem = e.to_string();
                store::update(db, entry.id, &PedidoPatch::erro(&mensagem))?;
                warn!(pedido_id = entry.id, erro = %mensagem, "Pedido sync failed");
                report.falhas += 1;
            }
        }
    }

    if let Ok(mut guard) = state.last_sync.lock() {
        *guard = Some(Utc::now().to_rfc3339());
    }

    info!(
        sucessos = report.sucessos,
        falhas = report.falhas,
        pulados = report.pulados,
        "Sync queue drained"
    );
    Ok(report)
}

/// Re-arm a failed entry: `ERRO → PENDENTE`. Does not submit; the next
/// drain picks it up. Any other current status is an `InvalidState` error.
pub fn retry_one(db: &DbState, id: i64) -> Result<(), SyncError> {
    let entry = store::get(db, id).map_err(SyncError::Store)?;
    if entry.status != SyncStatus::Erro {
        return Err(SyncError::InvalidState {
            id,
            status: entry.status,
        });
    }

    store::update(db, id, &PedidoPatch::status(SyncStatus::Pendente))?;
    info!(pedido_id = id, "Pedido re-armed for sync");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_TENTATIVAS;
    use crate::error::SubmitError;
    use crate::pedido::{Ambiente, PedidoPayload};
    use std::sync::atomic::AtomicUsize;

    fn test_db() -> DbState {
        DbState::open_in_memory().expect("open in-memory db")
    }

    fn payload(cliente: &str, valor: f64) -> PedidoPayload {
        PedidoPayload::new(cliente, "12.345.678/0001-90", valor)
    }

    /// Fails any payload whose customer name contains `FALHA`; counts calls.
    struct ScriptedSubmitter {
        calls: AtomicUsize,
        next_nunota: AtomicUsize,
    }

    impl ScriptedSubmitter {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                next_nunota: AtomicUsize::new(9000),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PedidoSubmitter for ScriptedSubmitter {
        async fn submit(
            &self,
            payload: &PedidoPayload,
            _idempotency_key: &str,
        ) -> Result<i64, SubmitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if payload.razao_social.contains("FALHA") {
                return Err(SubmitError::Backend(
                    "Erro interno no servidor de pedidos (HTTP 500)".to_string(),
                ));
            }
            Ok(self.next_nunota.fetch_add(1, Ordering::SeqCst) as i64)
        }
    }

    #[tokio::test]
    async fn test_empty_queue_is_a_noop() {
        let db = test_db();
        let state = SyncState::new();
        let submitter = ScriptedSubmitter::new();

        let report = process_queue(&db, &state, &submitter, DEFAULT_MAX_TENTATIVAS)
            .await
            .unwrap();

        assert_eq!(report, SyncReport::default());
        assert_eq!(submitter.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_pending_entries_sync_with_one_attempt_each() {
        let db = test_db();
        let state = SyncState::new();
        let submitter = ScriptedSubmitter::new();

        for nome in ["A", "B", "C"] {
            store::insert(&db, &payload(nome, 10.0), Ambiente::Offline).unwrap();
        }

        let report = process_queue(&db, &state, &submitter, DEFAULT_MAX_TENTATIVAS)
            .await
            .unwrap();

        assert_eq!(report.processados, 3);
        assert_eq!(report.sucessos, 3);
        assert_eq!(submitter.calls(), 3);

        for entry in store::list_all(&db).unwrap() {
            assert_eq!(entry.status, SyncStatus::Sucesso);
            assert_eq!(entry.tentativas, 1);
            assert!(entry.nunota_gerado.is_some());
            assert_eq!(entry.erro, None);
        }
        assert!(store::list_pending(&db).unwrap().is_empty());
        assert!(state.last_sync().is_some());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_the_batch() {
        let db = test_db();
        let state = SyncState::new();
        let submitter = ScriptedSubmitter::new();

        let a = store::insert(&db, &payload("Cliente A", 10.0), Ambiente::Offline).unwrap();
        let b = store::insert(&db, &payload("Cliente FALHA", 20.0), Ambiente::Offline).unwrap();
        let c = store::insert(&db, &payload("Cliente C", 30.0), Ambiente::Offline).unwrap();

        let report = process_queue(&db, &state, &submitter, DEFAULT_MAX_TENTATIVAS)
            .await
            .unwrap();

        assert_eq!(report.sucessos, 2);
        assert_eq!(report.falhas, 1);

        assert_eq!(store::get(&db, a).unwrap().status, SyncStatus::Sucesso);
        assert_eq!(store::get(&db, c).unwrap().status, SyncStatus::Sucesso);

        let falho = store::get(&db, b).unwrap();
        assert_eq!(falho.status, SyncStatus::Erro);
        assert!(!falho.synced);
        assert_eq!(falho.tentativas, 1);
        assert!(falho.erro.as_deref().unwrap_or("").contains("HTTP 500"));

        let pendentes: Vec<i64> = store::list_pending(&db).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(pendentes, vec![b]);
    }

    #[tokio::test]
    async fn test_fail_once_then_manual_retry_succeeds() {
        let db = test_db();
        let state = SyncState::new();
        let submitter = ScriptedSubmitter::new();

        let id = store::insert(&db, &payload("Cliente FALHA", 100.0), Ambiente::Offline).unwrap();
        process_queue(&db, &state, &submitter, DEFAULT_MAX_TENTATIVAS)
            .await
            .unwrap();
        assert_eq!(store::get(&db, id).unwrap().status, SyncStatus::Erro);

        // Operator fixes the customer record; rename simulates the fix.
        let mut corrigido = payload("Cliente Corrigido", 100.0);
        corrigido.cpf_cnpj = "12.345.678/0001-90".to_string();
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "UPDATE pedidos_sync SET payload = ?1 WHERE id = ?2",
                rusqlite::params![serde_json::to_string(&corrigido).unwrap(), id],
            )
            .unwrap();
        }

        retry_one(&db, id).unwrap();
        assert_eq!(store::get(&db, id).unwrap().status, SyncStatus::Pendente);

        process_queue(&db, &state, &submitter, DEFAULT_MAX_TENTATIVAS)
            .await
            .unwrap();

        let entry = store::get(&db, id).unwrap();
        assert_eq!(entry.status, SyncStatus::Sucesso);
        assert_eq!(entry.tentativas, 2);
        assert!(entry.nunota_gerado.is_some());
        assert_eq!(entry.erro, None);
    }

    #[tokio::test]
    async fn test_retry_one_rejects_non_erro_states() {
        let db = test_db();
        let id = store::insert(&db, &payload("Cliente", 10.0), Ambiente::Offline).unwrap();

        let err = retry_one(&db, id).unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidState {
                status: SyncStatus::Pendente,
                ..
            }
        ));

        let err = retry_one(&db, 999).unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
    }

    #[tokio::test]
    async fn test_second_drain_is_skipped_while_first_runs() {
        let db = test_db();
        let state = SyncState::new();
        let submitter = ScriptedSubmitter::new();

        store::insert(&db, &payload("Cliente", 10.0), Ambiente::Offline).unwrap();

        // Simulate a drain already holding the flag.
        state.in_flight.store(true, Ordering::SeqCst);
        let report = process_queue(&db, &state, &submitter, DEFAULT_MAX_TENTATIVAS)
            .await
            .unwrap();
        assert!(report.ja_em_andamento);
        assert_eq!(submitter.calls(), 0);

        // Once released, the same state drains normally.
        state.in_flight.store(false, Ordering::SeqCst);
        let report = process_queue(&db, &state, &submitter, DEFAULT_MAX_TENTATIVAS)
            .await
            .unwrap();
        assert!(!report.ja_em_andamento);
        assert_eq!(report.sucessos, 1);
        assert!(!state.is_in_flight());
    }

    #[tokio::test]
    async fn test_attempt_cap_holds_erro_entries_only() {
        let db = test_db();
        let state = SyncState::new();
        let submitter = ScriptedSubmitter::new();

        let id = store::insert(&db, &payload("Cliente FALHA", 10.0), Ambiente::Offline).unwrap();
        process_queue(&db, &state, &submitter, 2).await.unwrap();
        retry_one(&db, id).unwrap();
        process_queue(&db, &state, &submitter, 2).await.unwrap();

        let entry = store::get(&db, id).unwrap();
        assert_eq!(entry.status, SyncStatus::Erro);
        assert_eq!(entry.tentativas, 2);

        // Cap reached: the ERRO entry sits out every drain.
        let report = process_queue(&db, &state, &submitter, 2).await.unwrap();
        assert_eq!(report.pulados, 1);
        assert_eq!(report.processados, 0);
        assert_eq!(submitter.calls(), 2);
    }

    #[tokio::test]
    async fn test_manual_retry_past_the_cap_is_delivered() {
        let db = test_db();
        let state = SyncState::new();
        let submitter = ScriptedSubmitter::new();

        let id = store::insert(&db, &payload("Cliente FALHA", 10.0), Ambiente::Offline).unwrap();
        process_queue(&db, &state, &submitter, 1).await.unwrap();

        let report = process_queue(&db, &state, &submitter, 1).await.unwrap();
        assert_eq!(report.pulados, 1);

        // Backend side is fixed; the operator re-arms the capped entry.
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "UPDATE pedidos_sync SET payload = ?1 WHERE id = ?2",
                rusqlite::params![
                    serde_json::to_string(&payload("Cliente Corrigido", 10.0)).unwrap(),
                    id
                ],
            )
            .unwrap();
        }
        retry_one(&db, id).unwrap();

        // The re-armed PENDENTE entry is processed despite tentativas >= cap.
        let report = process_queue(&db, &state, &submitter, 1).await.unwrap();
        assert_eq!(report.processados, 1);
        assert_eq!(report.sucessos, 1);
        assert_eq!(report.pulados, 0);

        let entry = store::get(&db, id).unwrap();
        assert_eq!(entry.status, SyncStatus::Sucesso);
        assert_eq!(entry.tentativas, 2);
        assert!(entry.nunota_gerado.is_some());
    }
}
