//! Order submission client.
//!
//! The one real network call of the queue: POST a captured order to the
//! order-entry backend and get back the generated NUNOTA. Every request
//! carries the entry's idempotency key and is bounded by the repo-wide
//! 15-second timeout so a hung submission cannot stall the drain loop.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::SubmitError;
use crate::pedido::PedidoPayload;

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Canonical base URL for the backend: scheme added when missing (plain
/// http only for local addresses), and any trailing slashes or a trailing
/// `/api` segment removed so paths can be appended verbatim.
pub fn normalize_backend_url(url: &str) -> String {
    let trimmed = url.trim();

    let mut url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
        format!("http://{trimmed}")
    } else {
        format!("https://{trimmed}")
    };

    let mut keep = url.trim_end_matches('/').len();
    if url[..keep].ends_with("/api") {
        keep = url[..keep - 4].trim_end_matches('/').len();
    }
    url.truncate(keep);

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into the message stored on the entry.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Não foi possível conectar ao servidor de pedidos em {url}");
    }
    if err.is_timeout() {
        return format!("Tempo esgotado ao enviar pedido para {url}");
    }
    if err.is_builder() {
        return format!("URL do servidor de pedidos inválida: {url}");
    }
    format!("Erro de rede ao comunicar com {url}: {err}")
}

/// Convert an HTTP status code into the message stored on the entry.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Token de API inválido ou expirado".to_string(),
        403 => "Acesso negado pelo servidor de pedidos".to_string(),
        404 => "Endpoint de pedidos não encontrado".to_string(),
        s if s >= 500 => format!("Erro interno no servidor de pedidos (HTTP {s})"),
        s => format!("Resposta inesperada do servidor de pedidos (HTTP {s})"),
    }
}

/// Pull the generated NUNOTA out of a success body. The backend has used
/// both spellings over time.
fn parse_nunota(body: &Value) -> Option<i64> {
    body.get("nunota")
        .or_else(|| body.get("NUNOTA"))
        .or_else(|| body.get("nunotaGerado"))
        .and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        })
}

/// Pull the backend's own error message out of a failure body, if any.
fn parse_backend_message(body_text: &str, status: StatusCode) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body_text) {
        if let Some(message) = json
            .get("error")
            .or_else(|| json.get("message"))
            .and_then(Value::as_str)
        {
            return format!("{message} (HTTP {})", status.as_u16());
        }
    }
    if !body_text.trim().is_empty() {
        format!(
            "{} (HTTP {}): {}",
            status_error(status),
            status.as_u16(),
            body_text.trim()
        )
    } else {
        format!("{} (HTTP {})", status_error(status), status.as_u16())
    }
}

// ---------------------------------------------------------------------------
// Submitter seam
// ---------------------------------------------------------------------------

/// The sync engine's view of the backend: one bounded submission per entry.
pub trait PedidoSubmitter {
    fn submit(
        &self,
        payload: &PedidoPayload,
        idempotency_key: &str,
    ) -> impl std::future::Future<Output = Result<i64, SubmitError>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Real HTTP submitter against the order-entry backend.
pub struct PedidoApiClient {
    base_url: String,
    api_token: String,
    client: Client,
}

impl PedidoApiClient {
    pub fn new(config: &SyncConfig) -> Result<Self, SubmitError> {
        let client = Client::builder()
            .timeout(config.submit_timeout)
            .build()
            .map_err(|e| SubmitError::Transport(format!("Falha ao criar cliente HTTP: {e}")))?;

        Ok(Self {
            base_url: normalize_backend_url(&config.backend_url),
            api_token: config.api_token.clone(),
            client,
        })
    }
}

impl PedidoSubmitter for PedidoApiClient {
    async fn submit(&self, payload: &PedidoPayload, idempotency_key: &str) -> Result<i64, SubmitError> {
        let url = format!("{}/api/pedidos", self.base_url);
        debug!(cliente = %payload.razao_social, "Submitting pedido to backend");

        let resp = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_token)
            .header("X-Idempotency-Key", idempotency_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(friendly_error(&self.base_url, &e)))?;

        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(SubmitError::Backend(parse_backend_message(
                &body_text, status,
            )));
        }

        let body: Value = serde_json::from_str(&body_text)
            .map_err(|e| SubmitError::MalformedResponse(format!("JSON inválido: {e}")))?;
        let nunota = parse_nunota(&body).ok_or_else(|| {
            SubmitError::MalformedResponse("corpo sem NUNOTA".to_string())
        })?;

        info!(nunota, "Pedido accepted by backend");
        Ok(nunota)
    }
}

// ---------------------------------------------------------------------------
// Health probe
// ---------------------------------------------------------------------------

/// Lightweight reachability check against the backend health endpoint.
/// Any transport failure simply reads as offline.
pub async fn probe_health(backend_url: &str, timeout: Duration) -> bool {
    let base = normalize_backend_url(backend_url);
    let health_url = format!("{base}/api/health");

    let client = match Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(_) => return false,
    };

    match client.head(&health_url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
