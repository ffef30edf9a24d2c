//! Queue entry and order payload types.
//!
//! The payload mirrors the shape the Sankhya-style order-entry backend
//! expects: SCREAMING_CASE header fields plus an `itens` array. Fields the
//! queue does not interpret are preserved verbatim in `extras` so older
//! captures keep round-tripping after schema additions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sync lifecycle of a captured order.
///
/// `PENDENTE → SINCRONIZANDO → {SUCESSO | ERRO}`, with `ERRO → PENDENTE`
/// via manual retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    #[serde(rename = "PENDENTE")]
    Pendente,
    #[serde(rename = "SINCRONIZANDO")]
    Sincronizando,
    #[serde(rename = "SUCESSO")]
    Sucesso,
    #[serde(rename = "ERRO")]
    Erro,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pendente => "PENDENTE",
            SyncStatus::Sincronizando => "SINCRONIZANDO",
            SyncStatus::Sucesso => "SUCESSO",
            SyncStatus::Erro => "ERRO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDENTE" => Some(SyncStatus::Pendente),
            "SINCRONIZANDO" => Some(SyncStatus::Sincronizando),
            "SUCESSO" => Some(SyncStatus::Sucesso),
            "ERRO" => Some(SyncStatus::Erro),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment the order was captured in. Informational only; does not
/// affect processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ambiente {
    #[serde(rename = "OFFLINE")]
    Offline,
    #[serde(rename = "ONLINE")]
    Online,
}

impl Ambiente {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ambiente::Offline => "OFFLINE",
            Ambiente::Online => "ONLINE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "OFFLINE" => Some(Ambiente::Offline),
            "ONLINE" => Some(Ambiente::Online),
            _ => None,
        }
    }
}

impl fmt::Display for Ambiente {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedidoItem {
    #[serde(rename = "CODPROD")]
    pub codprod: i64,
    #[serde(rename = "DESCRPROD", skip_serializing_if = "Option::is_none")]
    pub descrprod: Option<String>,
    #[serde(rename = "QTDNEG")]
    pub qtdneg: f64,
    #[serde(rename = "VLRUNIT")]
    pub vlrunit: f64,
}

/// The order document submitted to the backend.
///
/// Only the submission client interprets this; the queue stores it opaquely.
/// `RAZAOSOCIAL` is accepted as a legacy spelling of `RAZAO_SOCIAL` because
/// both appear in captures from older dashboard builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedidoPayload {
    #[serde(rename = "RAZAO_SOCIAL", alias = "RAZAOSOCIAL")]
    pub razao_social: String,
    #[serde(rename = "CPF_CNPJ")]
    pub cpf_cnpj: String,
    #[serde(rename = "itens", default)]
    pub itens: Vec<PedidoItem>,
    #[serde(rename = "VLRNOTA")]
    pub vlrnota: f64,
    #[serde(rename = "CODPARC", skip_serializing_if = "Option::is_none")]
    pub codparc: Option<i64>,
    #[serde(rename = "CODVEND", skip_serializing_if = "Option::is_none")]
    pub codvend: Option<i64>,
    /// Fields this crate does not interpret, kept for forward compatibility.
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

impl PedidoPayload {
    pub fn new(razao_social: impl Into<String>, cpf_cnpj: impl Into<String>, vlrnota: f64) -> Self {
        Self {
            razao_social: razao_social.into(),
            cpf_cnpj: cpf_cnpj.into(),
            itens: Vec::new(),
            vlrnota,
            codparc: None,
            codvend: None,
            extras: BTreeMap::new(),
        }
    }
}

/// A queue entry: one captured order plus its sync bookkeeping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PedidoSync {
    pub id: i64,
    pub payload: PedidoPayload,
    pub ambiente: Ambiente,
    pub status: SyncStatus,
    /// Redundant cache of `status == SUCESSO`, kept for fast filtering.
    pub synced: bool,
    pub tentativas: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nunota_gerado: Option<i64>,
    pub idempotency_key: String,
    /// Capture timestamp, epoch millis.
    pub created_at: i64,
}
