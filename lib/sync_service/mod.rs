mod adapters;
mod backoff;
mod error;
mod orchestrator;
mod types;

#[cfg(test)]
mod test_support;

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use adapters::{
    production_adapters, ChargeSelectionAdapter, OperationAdapter, RecordAdapter,
    ScanResultAdapter,
};
pub use error::Error;
pub use orchestrator::SyncOrchestrator;
pub use types::{
    BackoffPolicy, FollowOn, OrchestratorConfig, SubmitAck, SubmitError, SubmitErrorKind,
    SyncRunReport, SyncTrigger, TriggerOutcome,
};

use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::outbox::{
    ChargeSelectionPayload, OperationPayload, OutboxCounts, OutboxStore, RecordPayload,
    ScanResultPayload, StoreError,
};

/// Facade the UI layer talks to: enqueue actions, ask for syncs, read status.
///
/// Owns the wiring between the durable store, the connectivity monitor, and
/// the orchestrator:
/// - an append while online kicks off a background drain (coalesced if one is
///   already running);
/// - `run_supervised` turns offline->online edges into sync runs and fires
///   the startup drain when the outbox is non-empty.
#[derive(Clone)]
pub struct SyncService {
    orchestrator: SyncOrchestrator,
    monitor: ConnectivityMonitor,
    last_report: Arc<Mutex<Option<SyncRunReport>>>,
}

impl SyncService {
    pub fn new(
        store: OutboxStore,
        adapters: Vec<Arc<dyn RecordAdapter>>,
        monitor: ConnectivityMonitor,
        config: OrchestratorConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            orchestrator: SyncOrchestrator::new(store, adapters, config)?,
            monitor,
            last_report: Arc::new(Mutex::new(None)),
        })
    }

    pub fn store(&self) -> &OutboxStore {
        self.orchestrator.store()
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub async fn enqueue_scan_result(
        &self,
        payload: ScanResultPayload,
    ) -> Result<String, StoreError> {
        self.enqueue(RecordPayload::ScanResult(payload)).await
    }

    pub async fn enqueue_charge_selection(
        &self,
        payload: ChargeSelectionPayload,
    ) -> Result<String, StoreError> {
        self.enqueue(RecordPayload::ChargeSelection(payload)).await
    }

    pub async fn enqueue_operation(
        &self,
        payload: OperationPayload,
    ) -> Result<String, StoreError> {
        self.enqueue(RecordPayload::Operation(payload)).await
    }

    /// Manual "sync now" trigger.
    pub async fn trigger_sync(&self) -> Result<TriggerOutcome, Error> {
        self.trigger(SyncTrigger::Manual).await
    }

    /// Number of buffered actions awaiting upload, for status display.
    pub async fn pending_count(&self) -> Result<i64, StoreError> {
        self.store().pending_count().await
    }

    pub async fn counts(&self) -> Result<OutboxCounts, StoreError> {
        self.store().counts().await
    }

    /// Most recent completed run, for operator awareness.
    pub fn last_sync_report(&self) -> Option<SyncRunReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reacts to connectivity edges until cancellation.
    ///
    /// Fires the startup drain first when the outbox is non-empty and the
    /// device is already online; an offline startup leaves the work for the
    /// next online edge. Trigger failures are logged, not fatal: the next
    /// edge retries.
    pub async fn run_supervised(&self, cancel_token: CancellationToken) -> Result<(), Error> {
        let subscription = self.monitor.subscribe();

        if self.pending_count().await? > 0 && self.monitor.current_state().is_online() {
            if let Err(err) = self.trigger(SyncTrigger::Startup).await {
                error!(
                    event = "startup_sync_failed",
                    error = %err,
                    "startup drain failed"
                );
            }
        }

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                maybe_event = subscription.next_event() => {
                    let Some(event) = maybe_event else {
                        break;
                    };
                    match event {
                        ConnectivityEvent::Online => {
                            if let Err(err) = self.trigger(SyncTrigger::Connectivity).await {
                                error!(
                                    event = "reconnect_sync_failed",
                                    error = %err,
                                    "drain after reconnect failed"
                                );
                            }
                        }
                        ConnectivityEvent::Offline => {
                            debug!(
                                event = "sync_supervisor_offline",
                                "connectivity lost; drains paused until reconnect"
                            );
                        }
                    }
                }
            }
        }

        info!(event = "sync_supervisor_stopped", "sync supervisor stopped");
        Ok(())
    }

    async fn enqueue(&self, payload: RecordPayload) -> Result<String, StoreError> {
        let record = self.store().append(payload).await?;

        if self.monitor.current_state().is_online() {
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(err) = service.trigger(SyncTrigger::Enqueue).await {
                    error!(
                        event = "enqueue_sync_failed",
                        error = %err,
                        "background drain after enqueue failed"
                    );
                }
            });
        }

        Ok(record.id)
    }

    async fn trigger(&self, trigger: SyncTrigger) -> Result<TriggerOutcome, Error> {
        let outcome = self.orchestrator.trigger_sync(trigger).await?;
        if let TriggerOutcome::Completed(report) = &outcome {
            *self
                .last_report
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        }
        Ok(outcome)
    }
}
