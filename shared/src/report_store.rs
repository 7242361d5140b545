//! Locally persisted sighting reports.
//!
//! The whole sequence lives in one key-value slot as a JSON array. The store
//! does no I/O itself: it says what to write, and a mutation is committed in
//! memory only once the write is confirmed, so a failed write leaves both
//! sides unchanged. At most one write is outstanding; later mutations queue
//! behind it and apply to the committed sequence in submission order.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::event::{Note, RecordUid, ReportId};

/// Storage slot holding the serialized report sequence.
pub const REPORTS_KEY: &str = "wantedReports";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportStoreError {
    #[error("no report at position {position} (store holds {len})")]
    Index { position: usize, len: usize },

    #[error("no report with id {0}")]
    NotFound(ReportId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("could not serialize reports: {0}")]
    Serialize(String),
}

/// Field names on disk are `uid`, `title`, `image`, `description`.
#[derive(Serialize, Clone, PartialEq, Eq)]
pub struct Report {
    pub id: ReportId,
    #[serde(rename = "uid")]
    pub record_uid: RecordUid,
    pub title: String,
    #[serde(rename = "image", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Bounded when written through [`Report::new`]; stored data is taken as is.
    #[serde(rename = "description")]
    pub note: String,
}

impl Report {
    pub fn new(
        record_uid: RecordUid,
        title: impl Into<String>,
        image_url: Option<String>,
        note: Note,
    ) -> Self {
        Self {
            id: ReportId::generate(),
            record_uid,
            title: title.into(),
            image_url: image_url.filter(|u| !u.is_empty()),
            note: note.into(),
        }
    }
}

// Notes are user-written free text; keep them out of logs.
impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("id", &self.id)
            .field("record_uid", &self.record_uid)
            .field("title", &self.title)
            .field("image_url", &self.image_url)
            .field("note_len", &self.note.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportMutation {
    Append(Report),
    DeleteAt(usize),
    DeleteById(ReportId),
}

/// What the caller must do after driving the store.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StoreStep {
    /// Bytes to write to [`REPORTS_KEY`].
    pub write: Option<Vec<u8>>,
    pub errors: Vec<ReportStoreError>,
}

#[derive(Debug, Default)]
pub struct ReportStore {
    reports: Vec<Report>,
    loading: bool,
    loaded: bool,
    in_flight: Option<Vec<Report>>,
    queued: VecDeque<ReportMutation>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the slot should be read now. A read already
    /// outstanding or completed is not repeated.
    pub fn begin_load(&mut self) -> bool {
        if self.loading || self.loaded {
            return false;
        }
        self.loading = true;
        true
    }

    /// Adopts the slot contents. Absent, unreadable, or corrupt data yields
    /// an empty sequence and is logged, never returned as an error.
    #[instrument(skip(self, slot))]
    pub fn load(&mut self, slot: Result<Option<Vec<u8>>, String>) -> StoreStep {
        self.loading = false;
        self.loaded = true;

        let (reports, assigned) = match slot {
            Ok(None) => {
                debug!("no stored reports");
                (Vec::new(), 0)
            }
            Ok(Some(raw)) => parse_stored(&raw),
            Err(e) => {
                warn!(error = %e, "reports slot unreadable, starting empty");
                (Vec::new(), 0)
            }
        };
        self.reports = reports;

        let mut step = StoreStep::default();
        if assigned > 0 {
            info!(assigned, "assigned ids to legacy reports");
            let snapshot = self.reports.clone();
            self.start_write(snapshot, &mut step);
        }
        self.pump(&mut step);
        step
    }

    /// Queues a mutation behind any outstanding write.
    pub fn submit(&mut self, mutation: ReportMutation) -> StoreStep {
        self.queued.push_back(mutation);
        let mut step = StoreStep::default();
        self.pump(&mut step);
        step
    }

    /// Commits or discards the outstanding write, then starts the next one.
    pub fn write_finished(&mut self, result: Result<(), String>) -> StoreStep {
        let mut step = StoreStep::default();
        match (self.in_flight.take(), result) {
            (Some(next), Ok(())) => {
                self.reports = next;
                info!(count = self.reports.len(), "reports committed");
            }
            (Some(_), Err(e)) => {
                warn!(error = %e, "reports write failed");
                step.errors.push(ReportStoreError::Storage(e));
            }
            (None, _) => warn!("write confirmation without a pending write"),
        }
        self.pump(&mut step);
        step
    }

    fn pump(&mut self, step: &mut StoreStep) {
        if !self.loaded {
            return;
        }
        while self.in_flight.is_none() {
            let Some(mutation) = self.queued.pop_front() else {
                break;
            };
            match self.apply(mutation) {
                Ok(next) => self.start_write(next, step),
                Err(e) => step.errors.push(e),
            }
        }
    }

    fn start_write(&mut self, next: Vec<Report>, step: &mut StoreStep) {
        match serde_json::to_vec(&next) {
            Ok(bytes) => {
                self.in_flight = Some(next);
                step.write = Some(bytes);
            }
            Err(e) => step.errors.push(ReportStoreError::Serialize(e.to_string())),
        }
    }

    fn apply(&self, mutation: ReportMutation) -> Result<Vec<Report>, ReportStoreError> {
        let mut next = self.reports.clone();
        match mutation {
            ReportMutation::Append(report) => next.push(report),
            ReportMutation::DeleteAt(position) => {
                if position >= next.len() {
                    return Err(ReportStoreError::Index {
                        position,
                        len: next.len(),
                    });
                }
                next.remove(position);
            }
            ReportMutation::DeleteById(id) => {
                let position = next
                    .iter()
                    .position(|r| r.id == id)
                    .ok_or(ReportStoreError::NotFound(id))?;
                next.remove(position);
            }
        }
        Ok(next)
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// A write is outstanding or mutations are waiting for one.
    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some() || !self.queued.is_empty()
    }

    /// Reports against one record, with their positions in the full sequence.
    pub fn reports_for<'a>(
        &'a self,
        uid: &'a RecordUid,
    ) -> impl Iterator<Item = (usize, &'a Report)> + 'a {
        self.reports
            .iter()
            .enumerate()
            .filter(move |(_, r)| &r.record_uid == uid)
    }
}

/// Reads the slot one element at a time. Missing or null text fields become
/// empty; no length bound applies to stored data. Non-object elements are
/// skipped. Returns the reports and how many needed a fresh id.
fn parse_stored(raw: &[u8]) -> (Vec<Report>, usize) {
    let elements = match serde_json::from_slice::<Vec<Value>>(raw) {
        Ok(elements) => elements,
        Err(e) => {
            warn!(error = %e, "stored reports are corrupt, starting empty");
            return (Vec::new(), 0);
        }
    };

    let mut assigned = 0;
    let mut reports = Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        if !element.is_object() {
            warn!(index, "skipping stored report that is not an object");
            continue;
        }
        let id = match text(element, "id") {
            id if id.is_empty() => {
                assigned += 1;
                ReportId::generate()
            }
            id => ReportId::new(id),
        };
        let image = text(element, "image");
        reports.push(Report {
            id,
            record_uid: RecordUid::new(text(element, "uid")),
            title: text(element, "title"),
            image_url: (!image.is_empty()).then_some(image),
            note: text(element, "description"),
        });
    }
    (reports, assigned)
}

fn text(element: &Value, field: &str) -> String {
    match element.get(field) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}
