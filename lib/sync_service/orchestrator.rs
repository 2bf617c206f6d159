use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::outbox::{now_epoch_ms, OutboxStore, RecordKind};

use super::adapters::RecordAdapter;
use super::backoff;
use super::error::Error;
use super::types::{FollowOn, OrchestratorConfig, SyncRunReport, SyncTrigger, TriggerOutcome};

/// Drains the outbox against the record adapters.
///
/// State machine: `Idle -> Running -> Idle`, with at most one running drain
/// system-wide. A trigger that arrives mid-run is coalesced: the in-flight
/// run listed its records at its own start and covers whatever was pending
/// at that moment; anything appended later belongs to the next trigger.
#[derive(Clone)]
pub struct SyncOrchestrator {
    store: OutboxStore,
    adapters: Arc<HashMap<RecordKind, Arc<dyn RecordAdapter>>>,
    config: OrchestratorConfig,
    run_guard: Arc<Mutex<()>>,
    run_seq: Arc<AtomicU64>,
}

impl SyncOrchestrator {
    /// Builds an orchestrator over one adapter per record kind.
    ///
    /// Fails fast when a kind is missing or doubled; a partial adapter set
    /// would silently strand records of the uncovered kind.
    pub fn new(
        store: OutboxStore,
        adapters: Vec<Arc<dyn RecordAdapter>>,
        config: OrchestratorConfig,
    ) -> Result<Self, Error> {
        let mut by_kind: HashMap<RecordKind, Arc<dyn RecordAdapter>> = HashMap::new();
        for adapter in adapters {
            let kind = adapter.kind();
            if by_kind.insert(kind, adapter).is_some() {
                return Err(Error::Orchestration(format!(
                    "duplicate adapter registered for kind {}",
                    kind.as_db_str()
                )));
            }
        }
        for kind in RecordKind::PRIORITY_ORDER {
            if !by_kind.contains_key(&kind) {
                return Err(Error::Orchestration(format!(
                    "no adapter registered for kind {}",
                    kind.as_db_str()
                )));
            }
        }

        Ok(Self {
            store,
            adapters: Arc::new(by_kind),
            config,
            run_guard: Arc::new(Mutex::new(())),
            run_seq: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn store(&self) -> &OutboxStore {
        &self.store
    }

    /// Requests one sync run.
    ///
    /// Returns `Coalesced` without touching the store when a run is already
    /// active; otherwise performs the drain and returns its report.
    pub async fn trigger_sync(&self, trigger: SyncTrigger) -> Result<TriggerOutcome, Error> {
        let Ok(_run_guard) = self.run_guard.try_lock() else {
            debug!(
                event = "sync_trigger_coalesced",
                trigger = trigger.as_str(),
                "sync already running; trigger dropped"
            );
            return Ok(TriggerOutcome::Coalesced);
        };

        let report = self.run(trigger).await?;
        Ok(TriggerOutcome::Completed(report))
    }

    /// One full drain pass. Caller holds the run guard.
    async fn run(&self, trigger: SyncTrigger) -> Result<SyncRunReport, Error> {
        let run_seq = self.run_seq.fetch_add(1, Ordering::Relaxed);
        let mut report = SyncRunReport::new(run_seq, trigger);

        info!(
            event = "sync_run_started",
            run_seq,
            trigger = trigger.as_str(),
            "starting sync run"
        );

        for kind in RecordKind::PRIORITY_ORDER {
            let adapter = self.adapters.get(&kind).ok_or_else(|| {
                Error::Orchestration(format!(
                    "adapter for kind {} vanished after construction",
                    kind.as_db_str()
                ))
            })?;

            // Snapshot semantics: records appended after this listing belong
            // to the next trigger.
            let pending = self.store.list_pending(kind).await?;
            for record in pending {
                if !backoff::is_eligible(&self.config.backoff, &record, now_epoch_ms()) {
                    report.skipped += 1;
                    debug!(
                        event = "sync_record_backoff_skipped",
                        record_id = %record.id,
                        kind = kind.as_db_str(),
                        retry_count = record.retry_count,
                        "record still inside backoff window"
                    );
                    continue;
                }

                let attempt =
                    tokio::time::timeout(self.config.submit_timeout, adapter.submit(&record)).await;

                match attempt {
                    Ok(Ok(ack)) => {
                        self.store.mark_synced(&record.id).await?;
                        report.succeeded += 1;
                        if let Some(data) = ack.follow_on {
                            report.follow_ons.push(FollowOn {
                                record_id: record.id.clone(),
                                kind,
                                data,
                            });
                        }
                    }
                    Ok(Err(submit_err)) if submit_err.is_retryable() => {
                        self.store
                            .record_failure(&record.id, &submit_err.message)
                            .await?;
                        report.failed += 1;
                        warn!(
                            event = "sync_record_retryable_failure",
                            record_id = %record.id,
                            kind = kind.as_db_str(),
                            retry_count = record.retry_count + 1,
                            error = %submit_err.message,
                            "submission failed; will retry on a later run"
                        );
                    }
                    Ok(Err(submit_err)) => {
                        self.store
                            .mark_failed(&record.id, &submit_err.message)
                            .await?;
                        report.dead_lettered += 1;
                        warn!(
                            event = "sync_record_dead_lettered",
                            record_id = %record.id,
                            kind = kind.as_db_str(),
                            error = %submit_err.message,
                            "remote rejected record; moved out of retry cycle"
                        );
                    }
                    Err(_elapsed) => {
                        let message = format!(
                            "submission timed out after {:?}",
                            self.config.submit_timeout
                        );
                        self.store.record_failure(&record.id, &message).await?;
                        report.failed += 1;
                        warn!(
                            event = "sync_record_timeout",
                            record_id = %record.id,
                            kind = kind.as_db_str(),
                            timeout_ms = self.config.submit_timeout.as_millis() as u64,
                            "submission exceeded its time budget"
                        );
                    }
                }
            }
        }

        info!(
            event = "sync_run_summary",
            run_seq,
            trigger = trigger.as_str(),
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            dead_lettered = report.dead_lettered,
            "sync run finished"
        );

        Ok(report)
    }
}
