use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use crate::outbox::{
    ChargeAllocation, ChargeSelectionPayload, MovementType, OperationPayload, PendingRecord,
    RecordKind, RecordPayload, ScanCodeClass, ScanResultPayload,
};

use super::adapters::RecordAdapter;
use super::types::{SubmitAck, SubmitError};

/// Shared submission log; one journal across several adapters captures the
/// global submit order of a run.
pub(super) type SubmissionJournal = Arc<Mutex<Vec<String>>>;

pub(super) fn new_journal() -> SubmissionJournal {
    Arc::new(Mutex::new(Vec::new()))
}

pub(super) fn scan_payload(label: &str) -> RecordPayload {
    RecordPayload::ScanResult(ScanResultPayload {
        code_class: ScanCodeClass::Artikel,
        id: format!("art-{label}"),
        label: label.to_string(),
        data: None,
    })
}

pub(super) fn selection_payload() -> RecordPayload {
    RecordPayload::ChargeSelection(ChargeSelectionPayload {
        artikel_id: "A-1".to_string(),
        benoetigte_menge: 20.0,
        chargen: vec![ChargeAllocation {
            charge_id: "CH-1".to_string(),
            menge: 20.0,
        }],
    })
}

pub(super) fn operation_payload(note: &str) -> RecordPayload {
    RecordPayload::Operation(OperationPayload {
        typ: MovementType::Eingang,
        artikel_id: "A-1".to_string(),
        menge: 20.0,
        von_lagerplatz_id: None,
        nach_lagerplatz_id: Some("LP-01".to_string()),
        chargen: vec![],
        belegnummer: None,
        mitarbeiter_id: "M-1".to_string(),
        bemerkung: Some(note.to_string()),
    })
}

/// Scripted adapter: per-record outcome plans, optional artificial latency,
/// and a journal of every submission in order. Unplanned submissions succeed.
pub(super) struct MockAdapter {
    kind: RecordKind,
    plans: Mutex<HashMap<String, VecDeque<Result<SubmitAck, SubmitError>>>>,
    journal: SubmissionJournal,
    delay: Option<Duration>,
}

impl MockAdapter {
    pub(super) fn new(kind: RecordKind, journal: SubmissionJournal) -> Self {
        Self {
            kind,
            plans: Mutex::new(HashMap::new()),
            journal,
            delay: None,
        }
    }

    pub(super) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(super) fn plan(&self, record_id: &str, outcomes: Vec<Result<SubmitAck, SubmitError>>) {
        self.plans
            .lock()
            .expect("plans mutex poisoned")
            .insert(record_id.to_string(), outcomes.into_iter().collect());
    }

    pub(super) fn submissions(&self) -> Vec<String> {
        self.journal.lock().expect("journal mutex poisoned").clone()
    }
}

impl RecordAdapter for MockAdapter {
    fn kind(&self) -> RecordKind {
        self.kind
    }

    fn submit<'a>(
        &'a self,
        record: &'a PendingRecord,
    ) -> BoxFuture<'a, Result<SubmitAck, SubmitError>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.journal
                .lock()
                .expect("journal mutex poisoned")
                .push(record.id.clone());

            let mut plans = self.plans.lock().expect("plans mutex poisoned");
            match plans.get_mut(&record.id).and_then(VecDeque::pop_front) {
                Some(outcome) => outcome,
                None => Ok(SubmitAck::accepted()),
            }
        })
    }
}

/// A full adapter set over one shared journal.
pub(super) fn mock_adapter_set(
    journal: &SubmissionJournal,
) -> (Arc<MockAdapter>, Arc<MockAdapter>, Arc<MockAdapter>) {
    (
        Arc::new(MockAdapter::new(RecordKind::ScanResult, Arc::clone(journal))),
        Arc::new(MockAdapter::new(
            RecordKind::ChargeSelection,
            Arc::clone(journal),
        )),
        Arc::new(MockAdapter::new(RecordKind::Operation, Arc::clone(journal))),
    )
}
