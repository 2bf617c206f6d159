use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for outbox store operations.
///
/// An `append` failure means the operator's action was NOT captured; callers
/// must surface it instead of swallowing it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database operation failed: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("failed to open outbox database at {path}: {message}")]
    Open { path: String, message: String },

    #[error("outbox migration failed: {0}")]
    Migration(String),

    #[error("payload (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid record kind value in database: {0}")]
    InvalidKind(String),

    #[error("invalid sync state value in database: {0}")]
    InvalidState(String),

    #[error("record kind mismatch for id {id}: stored {stored}, payload {payload}")]
    KindMismatch {
        id: String,
        stored: String,
        payload: String,
    },

    #[error("storage task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Closed set of buffered action kinds, in fixed drain-priority order.
///
/// Operations may reference batch selections already acknowledged server-side,
/// so they are drained last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    ScanResult,
    ChargeSelection,
    Operation,
}

impl RecordKind {
    /// Drain order used by every sync run.
    pub const PRIORITY_ORDER: [RecordKind; 3] = [
        RecordKind::ScanResult,
        RecordKind::ChargeSelection,
        RecordKind::Operation,
    ];

    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            RecordKind::ScanResult => "scan_result",
            RecordKind::ChargeSelection => "charge_selection",
            RecordKind::Operation => "operation",
        }
    }

    pub(crate) fn from_db_str(value: &str) -> Result<Self, StoreError> {
        match value {
            "scan_result" => Ok(RecordKind::ScanResult),
            "charge_selection" => Ok(RecordKind::ChargeSelection),
            "operation" => Ok(RecordKind::Operation),
            other => Err(StoreError::InvalidKind(other.to_string())),
        }
    }
}

/// Durable lifecycle states for a buffered record.
///
/// `Failed` is the dead-letter state: the remote rejected the record as
/// invalid and it must not re-enter the retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

impl SyncState {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        }
    }

    pub(crate) fn from_db_str(value: &str) -> Result<Self, StoreError> {
        match value {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            "failed" => Ok(SyncState::Failed),
            other => Err(StoreError::InvalidState(other.to_string())),
        }
    }
}

/// Classification of a decoded scan code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanCodeClass {
    Charge,
    Lagerplatz,
    Artikel,
    Mitarbeiter,
    Inventur,
    Pickliste,
}

/// A processed scan awaiting upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResultPayload {
    #[serde(rename = "type")]
    pub code_class: ScanCodeClass,
    pub id: String,
    pub label: String,
    /// Opaque classification detail captured at scan time; forwarded as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// One batch drawn against a required quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeAllocation {
    pub charge_id: String,
    pub menge: f64,
}

/// Confirmed batch quantities for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSelectionPayload {
    pub artikel_id: String,
    pub benoetigte_menge: f64,
    pub chargen: Vec<ChargeAllocation>,
}

/// Goods-movement category. Stock counts are booked through the same
/// movement call as the other categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Eingang,
    Ausgang,
    Umlagerung,
    Inventur,
}

/// A goods-movement request buffered for upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPayload {
    pub typ: MovementType,
    pub artikel_id: String,
    pub menge: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub von_lagerplatz_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nach_lagerplatz_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chargen: Vec<ChargeAllocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belegnummer: Option<String>,
    pub mitarbeiter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bemerkung: Option<String>,
}

/// Kind-specific business data carried by a record.
///
/// The kind is the variant; orchestration matches this exhaustively, so a new
/// record kind cannot be added without deciding its drain position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordPayload {
    ScanResult(ScanResultPayload),
    ChargeSelection(ChargeSelectionPayload),
    Operation(OperationPayload),
}

impl RecordPayload {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordPayload::ScanResult(_) => RecordKind::ScanResult,
            RecordPayload::ChargeSelection(_) => RecordKind::ChargeSelection,
            RecordPayload::Operation(_) => RecordKind::Operation,
        }
    }
}

/// The unit of durability: one buffered operator action.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    /// Generated at creation, never reused; doubles as the idempotency key
    /// for every submission attempt.
    pub id: String,
    pub payload: RecordPayload,
    pub created_at_ms: i64,
    pub sync_state: SyncState,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub last_attempt_at_ms: Option<i64>,
    pub synced_at_ms: Option<i64>,
}

impl PendingRecord {
    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }
}

/// Per-state record totals for operator status display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxCounts {
    pub pending: i64,
    pub synced: i64,
    pub failed: i64,
}

impl OutboxCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.synced + self.failed
    }
}
