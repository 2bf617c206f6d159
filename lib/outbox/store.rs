use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use diesel::sql_query;
use diesel::sql_types::{BigInt, Integer, Nullable, Text};
use diesel::sqlite::SqliteConnection;
use diesel::RunQueryDsl;
use tracing::debug;
use uuid::Uuid;

use crate::db::open_outbox_database;

use super::now_epoch_ms;
use super::types::{
    OutboxCounts, PendingRecord, RecordKind, RecordPayload, StoreError, SyncState,
};

#[derive(Debug, diesel::QueryableByName)]
struct RecordRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    kind: String,
    #[diesel(sql_type = Text)]
    payload: String,
    #[diesel(sql_type = BigInt)]
    created_at_ms: i64,
    #[diesel(sql_type = Text)]
    sync_state: String,
    #[diesel(sql_type = Integer)]
    retry_count: i32,
    #[diesel(sql_type = Nullable<Text>)]
    last_error: Option<String>,
    #[diesel(sql_type = Nullable<BigInt>)]
    last_attempt_at_ms: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    synced_at_ms: Option<i64>,
}

#[derive(Debug, diesel::QueryableByName)]
struct StateCountRow {
    #[diesel(sql_type = Text)]
    sync_state: String,
    #[diesel(sql_type = BigInt)]
    count: i64,
}

const SELECT_COLUMNS: &str = "id, kind, payload, created_at_ms, sync_state, retry_count, \
     last_error, last_attempt_at_ms, synced_at_ms";

/// Append-only durable store for buffered operator actions.
///
/// One SQLite connection is shared behind a mutex and every contract
/// operation is a single SQL statement under that lock, so a racing
/// `mark_synced`/`record_failure` pair on the same id cannot interleave
/// between lookup and write. Blocking work runs on the tokio blocking pool.
#[derive(Clone)]
pub struct OutboxStore {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl OutboxStore {
    /// Opens (creating if absent) the outbox database at `path` and applies
    /// pending migrations.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = open_outbox_database(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens a fresh in-memory store. Test-oriented; the data dies with the
    /// returned handle.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    /// Persists a new `Pending` record and returns it.
    ///
    /// The insert is one statement: either the row is durably present after
    /// this returns `Ok`, or the call failed and the caller must surface the
    /// error to the operator.
    pub async fn append(&self, payload: RecordPayload) -> Result<PendingRecord, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let record = new_record(payload)?;
            let payload_json = serde_json::to_string(&record.payload)?;

            sql_query(
                "INSERT INTO outbox_records \
                 (id, kind, payload, created_at_ms, sync_state, retry_count) \
                 VALUES (?, ?, ?, ?, 'pending', 0)",
            )
            .bind::<Text, _>(record.id.as_str())
            .bind::<Text, _>(record.kind().as_db_str())
            .bind::<Text, _>(payload_json.as_str())
            .bind::<BigInt, _>(record.created_at_ms)
            .execute(&mut *lock(&conn))?;

            debug!(
                event = "outbox_record_appended",
                record_id = %record.id,
                kind = record.kind().as_db_str(),
                "appended record to outbox"
            );

            Ok(record)
        })
        .await?
    }

    /// Returns all `Pending` records of one kind, FIFO by creation time.
    pub async fn list_pending(&self, kind: RecordKind) -> Result<Vec<PendingRecord>, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let rows: Vec<RecordRow> = sql_query(format!(
                "SELECT {SELECT_COLUMNS} FROM outbox_records \
                 WHERE kind = ? AND sync_state = 'pending' \
                 ORDER BY created_at_ms ASC, rowid ASC"
            ))
            .bind::<Text, _>(kind.as_db_str())
            .load(&mut *lock(&conn))?;

            rows.into_iter().map(map_record_row).collect()
        })
        .await?
    }

    /// Transitions `Pending -> Synced`. Idempotent: a second call on the same
    /// id affects zero rows and reports `false`.
    pub async fn mark_synced(&self, id: &str) -> Result<bool, StoreError> {
        let conn = Arc::clone(&self.conn);
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let affected = sql_query(
                "UPDATE outbox_records \
                 SET sync_state = 'synced', synced_at_ms = ?, last_error = NULL \
                 WHERE id = ? AND sync_state = 'pending'",
            )
            .bind::<BigInt, _>(now_epoch_ms())
            .bind::<Text, _>(id.as_str())
            .execute(&mut *lock(&conn))?;

            Ok(affected > 0)
        })
        .await?
    }

    /// Records one failed submission attempt: `retry_count + 1`, failure
    /// message, attempt timestamp. No-op when the record is no longer
    /// pending (it may have been synced by a racing run).
    pub async fn record_failure(&self, id: &str, message: &str) -> Result<bool, StoreError> {
        let conn = Arc::clone(&self.conn);
        let id = id.to_string();
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            let affected = sql_query(
                "UPDATE outbox_records \
                 SET retry_count = retry_count + 1, last_error = ?, last_attempt_at_ms = ? \
                 WHERE id = ? AND sync_state = 'pending'",
            )
            .bind::<Text, _>(message.as_str())
            .bind::<BigInt, _>(now_epoch_ms())
            .bind::<Text, _>(id.as_str())
            .execute(&mut *lock(&conn))?;

            Ok(affected > 0)
        })
        .await?
    }

    /// Dead-letters a record after a terminal rejection: `Pending -> Failed`.
    /// The record leaves the retry cycle but is never deleted.
    pub async fn mark_failed(&self, id: &str, message: &str) -> Result<bool, StoreError> {
        let conn = Arc::clone(&self.conn);
        let id = id.to_string();
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            let affected = sql_query(
                "UPDATE outbox_records \
                 SET sync_state = 'failed', last_error = ?, last_attempt_at_ms = ? \
                 WHERE id = ? AND sync_state = 'pending'",
            )
            .bind::<Text, _>(message.as_str())
            .bind::<BigInt, _>(now_epoch_ms())
            .bind::<Text, _>(id.as_str())
            .execute(&mut *lock(&conn))?;

            Ok(affected > 0)
        })
        .await?
    }

    /// Number of `Pending` records across all kinds, for status display.
    pub async fn pending_count(&self) -> Result<i64, StoreError> {
        Ok(self.counts().await?.pending)
    }

    /// Per-state record totals.
    pub async fn counts(&self) -> Result<OutboxCounts, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let rows: Vec<StateCountRow> = sql_query(
                "SELECT sync_state, COUNT(*) AS count FROM outbox_records GROUP BY sync_state",
            )
            .load(&mut *lock(&conn))?;

            let mut counts = OutboxCounts::default();
            for row in rows {
                match SyncState::from_db_str(&row.sync_state)? {
                    SyncState::Pending => counts.pending = row.count,
                    SyncState::Synced => counts.synced = row.count,
                    SyncState::Failed => counts.failed = row.count,
                }
            }
            Ok(counts)
        })
        .await?
    }

    /// Returns dead-lettered records (all kinds) for operator triage, oldest
    /// first.
    pub async fn list_failed(&self) -> Result<Vec<PendingRecord>, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let rows: Vec<RecordRow> = sql_query(format!(
                "SELECT {SELECT_COLUMNS} FROM outbox_records \
                 WHERE sync_state = 'failed' \
                 ORDER BY created_at_ms ASC, rowid ASC"
            ))
            .load(&mut *lock(&conn))?;

            rows.into_iter().map(map_record_row).collect()
        })
        .await?
    }

    /// Housekeeping: deletes `Synced` records whose acknowledgment is older
    /// than `retention`. Never touches `Pending` or `Failed` rows. Kept off
    /// the sync path on purpose; only an explicit operator/ops action calls
    /// this.
    pub async fn prune_synced(&self, retention: Duration) -> Result<usize, StoreError> {
        let conn = Arc::clone(&self.conn);
        let cutoff = now_epoch_ms().saturating_sub(i64::try_from(retention.as_millis()).unwrap_or(i64::MAX));
        tokio::task::spawn_blocking(move || {
            let deleted = sql_query(
                "DELETE FROM outbox_records \
                 WHERE sync_state = 'synced' AND synced_at_ms IS NOT NULL AND synced_at_ms < ?",
            )
            .bind::<BigInt, _>(cutoff)
            .execute(&mut *lock(&conn))?;

            Ok(deleted)
        })
        .await?
    }
}

fn lock(conn: &Arc<Mutex<SqliteConnection>>) -> MutexGuard<'_, SqliteConnection> {
    // A poisoned lock only means another store call panicked mid-statement;
    // the connection itself is still usable.
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn new_record(payload: RecordPayload) -> Result<PendingRecord, StoreError> {
    let created_at_ms = now_epoch_ms();
    Ok(PendingRecord {
        id: generate_record_id(created_at_ms),
        payload,
        created_at_ms,
        sync_state: SyncState::Pending,
        retry_count: 0,
        last_error: None,
        last_attempt_at_ms: None,
        synced_at_ms: None,
    })
}

/// Record ids are `{creation millis}-{random suffix}`: unique across the
/// store's lifetime and naturally creation-ordered when compared as strings
/// of equal timestamp width.
fn generate_record_id(created_at_ms: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{created_at_ms}-{}", &suffix[..8])
}

fn map_record_row(row: RecordRow) -> Result<PendingRecord, StoreError> {
    let stored_kind = RecordKind::from_db_str(&row.kind)?;
    let payload: RecordPayload = serde_json::from_str(&row.payload)?;

    if payload.kind() != stored_kind {
        return Err(StoreError::KindMismatch {
            id: row.id,
            stored: stored_kind.as_db_str().to_string(),
            payload: payload.kind().as_db_str().to_string(),
        });
    }

    Ok(PendingRecord {
        id: row.id,
        payload,
        created_at_ms: row.created_at_ms,
        sync_state: SyncState::from_db_str(&row.sync_state)?,
        retry_count: row.retry_count,
        last_error: row.last_error,
        last_attempt_at_ms: row.last_attempt_at_ms,
        synced_at_ms: row.synced_at_ms,
    })
}
