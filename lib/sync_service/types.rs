use std::time::Duration;

use crate::outbox::RecordKind;

/// Successful submission acknowledgment from the remote system.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitAck {
    /// Server-issued follow-on data (for example batches created by an
    /// inbound movement), passed through unchanged for the UI collaborator.
    pub follow_on: Option<serde_json::Value>,
}

impl SubmitAck {
    pub fn accepted() -> Self {
        Self { follow_on: None }
    }

    pub fn with_follow_on(follow_on: serde_json::Value) -> Self {
        Self {
            follow_on: Some(follow_on),
        }
    }
}

/// Failure classes for one submission attempt.
///
/// `Network` failures drive the retry cycle; `Validation` failures are
/// terminal for the record and dead-letter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorKind {
    Network,
    Validation,
}

/// Typed submission failure with human-readable details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitError {
    pub kind: SubmitErrorKind,
    pub message: String,
}

impl SubmitError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: SubmitErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: SubmitErrorKind::Validation,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == SubmitErrorKind::Network
    }
}

/// Governs when a previously failed record becomes eligible for another
/// attempt. Applied as a per-run gate, never as an in-run sleep.
///
/// Zeroing `initial` disables the gate entirely: every trigger then
/// reattempts every pending record, which is the undamped behavior of the
/// source design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(300),
            jitter: Duration::from_millis(500),
        }
    }
}

impl BackoffPolicy {
    pub fn disabled() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Upper bound on one adapter submission; an unresponsive call must not
    /// stall the single run slot indefinitely.
    pub submit_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// What caused a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Offline -> online edge from the connectivity monitor.
    Connectivity,
    /// Explicit "sync now" action.
    Manual,
    /// Application start with a non-empty outbox.
    Startup,
    /// A record was appended while already online.
    Enqueue,
}

impl SyncTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncTrigger::Connectivity => "connectivity",
            SyncTrigger::Manual => "manual",
            SyncTrigger::Startup => "startup",
            SyncTrigger::Enqueue => "enqueue",
        }
    }
}

/// Follow-on data surfaced by one synced record.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowOn {
    pub record_id: String,
    pub kind: RecordKind,
    pub data: serde_json::Value,
}

/// Aggregate result of one sync run. Ephemeral: exists only to report the
/// pass to its trigger's caller and the logs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRunReport {
    pub run_seq: u64,
    pub trigger: SyncTrigger,
    pub succeeded: usize,
    pub failed: usize,
    /// Records whose backoff window had not elapsed at drain time.
    pub skipped: usize,
    /// Records dead-lettered by a terminal rejection during this run.
    pub dead_lettered: usize,
    pub follow_ons: Vec<FollowOn>,
}

impl SyncRunReport {
    pub(crate) fn new(run_seq: u64, trigger: SyncTrigger) -> Self {
        Self {
            run_seq,
            trigger,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            dead_lettered: 0,
            follow_ons: Vec::new(),
        }
    }

    /// True when nothing needed submission and nothing was held back.
    pub fn is_drained(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Result of asking for a sync run.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Completed(SyncRunReport),
    /// A run was already active; this trigger was dropped and the in-flight
    /// run's snapshot covers whatever was pending at its start.
    Coalesced,
}

impl TriggerOutcome {
    pub fn report(&self) -> Option<&SyncRunReport> {
        match self {
            TriggerOutcome::Completed(report) => Some(report),
            TriggerOutcome::Coalesced => None,
        }
    }
}
