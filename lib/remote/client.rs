use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connectivity::ConnectivityProbe;
use crate::outbox::{ChargeSelectionPayload, OperationPayload, ScanResultPayload};
use crate::sync_service::{SubmitAck, SubmitError};

use super::error_mapping::{map_status, map_transport_error};

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

const SCAN_ENDPOINT: &str = "/api/v1/mobile/scan";
const CHARGE_SELECTION_ENDPOINT: &str = "/api/v1/charge/auswahl";
const MOVEMENT_ENDPOINT: &str = "/api/v1/lager/bewegung";
const HEALTH_ENDPOINT: &str = "/health";

/// Generic acknowledgment envelope shared by the submission endpoints.
///
/// `erfolg = false` with 2xx is how the backend reports business-level
/// rejections; `neue_chargen` carries batches the backend created as a side
/// effect of an inbound movement.
#[derive(Debug, Deserialize)]
struct AckEnvelope {
    #[serde(default = "default_erfolg")]
    erfolg: bool,
    #[serde(default)]
    fehlermeldung: Option<String>,
    #[serde(default)]
    neue_chargen: Option<serde_json::Value>,
}

fn default_erfolg() -> bool {
    true
}

/// HTTP client for the warehouse backend's mobile submission endpoints.
///
/// Every submission carries the record id as idempotency key, so a resend
/// after a lost acknowledgment does not double-apply a movement server-side.
pub struct WarehouseApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl WarehouseApiClient {
    pub fn new(base_url: String, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn submit_scan_result(
        &self,
        payload: &ScanResultPayload,
        idempotency_key: &str,
    ) -> Result<SubmitAck, SubmitError> {
        self.submit(SCAN_ENDPOINT, payload, idempotency_key).await
    }

    pub async fn submit_charge_selection(
        &self,
        payload: &ChargeSelectionPayload,
        idempotency_key: &str,
    ) -> Result<SubmitAck, SubmitError> {
        self.submit(CHARGE_SELECTION_ENDPOINT, payload, idempotency_key)
            .await
    }

    pub async fn submit_movement(
        &self,
        payload: &OperationPayload,
        idempotency_key: &str,
    ) -> Result<SubmitAck, SubmitError> {
        self.submit(MOVEMENT_ENDPOINT, payload, idempotency_key)
            .await
    }

    /// Cheap reachability check used by the default connectivity probe.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}{HEALTH_ENDPOINT}", self.base_url);
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(
                    event = "health_check_failed",
                    error = %err,
                    "backend health check failed"
                );
                false
            }
        }
    }

    async fn submit<T: Serialize>(
        &self,
        endpoint: &str,
        payload: &T,
        idempotency_key: &str,
    ) -> Result<SubmitAck, SubmitError> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self
            .http
            .post(url)
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| map_transport_error(&err, endpoint))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| map_transport_error(&err, endpoint))?;

        if !status.is_success() {
            return Err(map_status(status, endpoint, Some(&body)));
        }

        interpret_ack_body(endpoint, &body)
    }
}

fn interpret_ack_body(endpoint: &str, body: &str) -> Result<SubmitAck, SubmitError> {
    if body.trim().is_empty() {
        return Ok(SubmitAck::accepted());
    }

    let envelope: AckEnvelope = serde_json::from_str(body).map_err(|err| {
        SubmitError::network(format!(
            "undecodable acknowledgment from {endpoint} (retryable): {err}"
        ))
    })?;

    if !envelope.erfolg {
        return Err(SubmitError::validation(
            envelope
                .fehlermeldung
                .unwrap_or_else(|| format!("remote rejected submission to {endpoint}")),
        ));
    }

    Ok(match envelope.neue_chargen {
        Some(follow_on) => SubmitAck::with_follow_on(follow_on),
        None => SubmitAck::accepted(),
    })
}

/// Default connectivity probe: pings the backend health endpoint.
pub struct HttpPingProbe {
    client: Arc<WarehouseApiClient>,
}

impl HttpPingProbe {
    pub fn new(client: Arc<WarehouseApiClient>) -> Self {
        Self { client }
    }
}

impl ConnectivityProbe for HttpPingProbe {
    fn check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.client.health_check().await })
    }
}
