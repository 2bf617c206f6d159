use std::sync::Arc;

use futures::future::BoxFuture;

use crate::outbox::{PendingRecord, RecordKind, RecordPayload};
use crate::remote::WarehouseApiClient;

use super::types::{SubmitAck, SubmitError};

/// Translates one buffered record into its remote submission call and
/// interprets the outcome.
///
/// This trait exists so orchestration logic can be unit-tested against
/// deterministic scripted outcomes without live network access. Adapters must
/// pass the record id through as the idempotency key on every attempt.
pub trait RecordAdapter: Send + Sync {
    fn kind(&self) -> RecordKind;

    fn submit<'a>(
        &'a self,
        record: &'a PendingRecord,
    ) -> BoxFuture<'a, Result<SubmitAck, SubmitError>>;
}

impl<T> RecordAdapter for Arc<T>
where
    T: RecordAdapter + ?Sized,
{
    fn kind(&self) -> RecordKind {
        (**self).kind()
    }

    fn submit<'a>(
        &'a self,
        record: &'a PendingRecord,
    ) -> BoxFuture<'a, Result<SubmitAck, SubmitError>> {
        (**self).submit(record)
    }
}

fn wrong_payload(expected: RecordKind, record: &PendingRecord) -> SubmitError {
    SubmitError::validation(format!(
        "adapter for {} records received a {} record (id {})",
        expected.as_db_str(),
        record.kind().as_db_str(),
        record.id
    ))
}

/// Uploads scan classifications.
pub struct ScanResultAdapter {
    client: Arc<WarehouseApiClient>,
}

impl ScanResultAdapter {
    pub fn new(client: Arc<WarehouseApiClient>) -> Self {
        Self { client }
    }
}

impl RecordAdapter for ScanResultAdapter {
    fn kind(&self) -> RecordKind {
        RecordKind::ScanResult
    }

    fn submit<'a>(
        &'a self,
        record: &'a PendingRecord,
    ) -> BoxFuture<'a, Result<SubmitAck, SubmitError>> {
        Box::pin(async move {
            match &record.payload {
                RecordPayload::ScanResult(payload) => {
                    self.client.submit_scan_result(payload, &record.id).await
                }
                _ => Err(wrong_payload(self.kind(), record)),
            }
        })
    }
}

/// Uploads confirmed batch quantity selections.
pub struct ChargeSelectionAdapter {
    client: Arc<WarehouseApiClient>,
}

impl ChargeSelectionAdapter {
    pub fn new(client: Arc<WarehouseApiClient>) -> Self {
        Self { client }
    }
}

impl RecordAdapter for ChargeSelectionAdapter {
    fn kind(&self) -> RecordKind {
        RecordKind::ChargeSelection
    }

    fn submit<'a>(
        &'a self,
        record: &'a PendingRecord,
    ) -> BoxFuture<'a, Result<SubmitAck, SubmitError>> {
        Box::pin(async move {
            match &record.payload {
                RecordPayload::ChargeSelection(payload) => {
                    self.client
                        .submit_charge_selection(payload, &record.id)
                        .await
                }
                _ => Err(wrong_payload(self.kind(), record)),
            }
        })
    }
}

/// Books goods movements. Inbound movements may come back with batches the
/// backend created; those travel on unchanged as follow-on data.
pub struct OperationAdapter {
    client: Arc<WarehouseApiClient>,
}

impl OperationAdapter {
    pub fn new(client: Arc<WarehouseApiClient>) -> Self {
        Self { client }
    }
}

impl RecordAdapter for OperationAdapter {
    fn kind(&self) -> RecordKind {
        RecordKind::Operation
    }

    fn submit<'a>(
        &'a self,
        record: &'a PendingRecord,
    ) -> BoxFuture<'a, Result<SubmitAck, SubmitError>> {
        Box::pin(async move {
            match &record.payload {
                RecordPayload::Operation(payload) => {
                    self.client.submit_movement(payload, &record.id).await
                }
                _ => Err(wrong_payload(self.kind(), record)),
            }
        })
    }
}

/// The full production adapter set over one shared backend client.
pub fn production_adapters(client: Arc<WarehouseApiClient>) -> Vec<Arc<dyn RecordAdapter>> {
    vec![
        Arc::new(ScanResultAdapter::new(Arc::clone(&client))),
        Arc::new(ChargeSelectionAdapter::new(Arc::clone(&client))),
        Arc::new(OperationAdapter::new(client)),
    ]
}
