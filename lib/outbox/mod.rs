mod store;
mod types;

use std::time::{SystemTime, UNIX_EPOCH};

pub use store::OutboxStore;
pub use types::{
    ChargeAllocation, ChargeSelectionPayload, MovementType, OperationPayload, OutboxCounts,
    PendingRecord, RecordKind, RecordPayload, ScanCodeClass, ScanResultPayload, StoreError,
    SyncState,
};

/// Milliseconds since the UNIX epoch; the store's creation/attempt clock.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
