use std::time::Duration;

use crate::outbox::PendingRecord;

use super::types::BackoffPolicy;

/// Decides whether a pending record may be attempted in the current run.
///
/// First attempts are always eligible. After a failure, the record waits out
/// an exponential window derived from its `retry_count`; a run arriving
/// earlier skips it (reported as `skipped`) rather than sleeping, so one
/// waiting record never stalls the rest of the drain.
pub(crate) fn is_eligible(policy: &BackoffPolicy, record: &PendingRecord, now_ms: i64) -> bool {
    if record.retry_count == 0 {
        return true;
    }
    let Some(last_attempt_ms) = record.last_attempt_at_ms else {
        return true;
    };

    let delay = compute_backoff_delay(policy, record.retry_count, &record.id);
    if delay.is_zero() {
        return true;
    }

    let ready_at_ms =
        last_attempt_ms.saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
    now_ms >= ready_at_ms
}

/// Exponential backoff with deterministic per-record jitter.
///
/// Jitter is derived from the record id so retries of different records do
/// not synchronize, while repeated evaluations of the same record agree on
/// its window.
pub(crate) fn compute_backoff_delay(
    policy: &BackoffPolicy,
    retry_count: i32,
    record_id: &str,
) -> Duration {
    if policy.initial.is_zero() && policy.jitter.is_zero() {
        return Duration::ZERO;
    }

    let attempt = u32::try_from(retry_count.max(1)).unwrap_or(1);
    let shift = u32::min(attempt.saturating_sub(1), 20);
    let exponential_ms = policy.initial.as_millis().saturating_mul(1u128 << shift);
    let capped_ms = exponential_ms.min(policy.max.as_millis());

    let jitter_ms = if policy.jitter.is_zero() {
        0
    } else {
        deterministic_jitter(record_id, attempt, policy.jitter.as_millis())
    };

    let total_ms = capped_ms.saturating_add(jitter_ms);
    Duration::from_millis(total_ms.min(u64::MAX as u128) as u64)
}

fn deterministic_jitter(record_id: &str, attempt: u32, jitter_cap: u128) -> u128 {
    if jitter_cap == 0 {
        return 0;
    }

    let mut x = (attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    for byte in record_id.as_bytes() {
        x = (x ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01B3);
    }
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;

    (x as u128) % (jitter_cap + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::{RecordPayload, ScanCodeClass, ScanResultPayload, SyncState};

    fn record(retry_count: i32, last_attempt_at_ms: Option<i64>) -> PendingRecord {
        PendingRecord {
            id: "1700000000000-abcd1234".to_string(),
            payload: RecordPayload::ScanResult(ScanResultPayload {
                code_class: ScanCodeClass::Charge,
                id: "CH-1".to_string(),
                label: "Charge 1".to_string(),
                data: None,
            }),
            created_at_ms: 1_700_000_000_000,
            sync_state: SyncState::Pending,
            retry_count,
            last_error: None,
            last_attempt_at_ms,
            synced_at_ms: None,
        }
    }

    fn policy_ms(initial: u64, max: u64, jitter: u64) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(initial),
            max: Duration::from_millis(max),
            jitter: Duration::from_millis(jitter),
        }
    }

    #[test]
    fn first_attempt_is_always_eligible() {
        let policy = BackoffPolicy::default();
        assert!(is_eligible(&policy, &record(0, None), 0));
    }

    #[test]
    fn record_inside_window_is_held_back() {
        let policy = policy_ms(1_000, 60_000, 0);
        let failed_at = 10_000;
        let held = record(1, Some(failed_at));

        assert!(!is_eligible(&policy, &held, failed_at + 500));
        assert!(is_eligible(&policy, &held, failed_at + 1_000));
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = policy_ms(100, 1_000, 0);

        let first = compute_backoff_delay(&policy, 1, "r");
        let second = compute_backoff_delay(&policy, 2, "r");
        let fifth = compute_backoff_delay(&policy, 5, "r");
        let tenth = compute_backoff_delay(&policy, 10, "r");

        assert_eq!(first, Duration::from_millis(100));
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(fifth, Duration::from_millis(1_000));
        assert_eq!(tenth, Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_is_deterministic_per_record_and_bounded() {
        let policy = policy_ms(0, 0, 250);

        let a1 = compute_backoff_delay(&policy, 1, "record-a");
        let a2 = compute_backoff_delay(&policy, 1, "record-a");
        let b = compute_backoff_delay(&policy, 1, "record-b");

        assert_eq!(a1, a2);
        assert!(a1 <= Duration::from_millis(250));
        assert!(b <= Duration::from_millis(250));
    }

    #[test]
    fn disabled_policy_never_holds_records_back() {
        let policy = BackoffPolicy::disabled();
        let held = record(7, Some(i64::MAX - 1));
        assert!(is_eligible(&policy, &held, 0));
    }
}
