use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::FetchError;
use crate::config::Config;
use crate::pagination::NavIntent;
use crate::record::{Page, Record};

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(RecordUid);
typed_id!(ReportId);

impl ReportId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("value too long ({len} > {max})")]
    TooLong { len: usize, max: usize },
}

// --- Bounded text ---

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct BoundedText<const MAX: usize>(String);

impl<const MAX: usize> BoundedText<MAX> {
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.len() > MAX {
            return Err(ValidationError::TooLong {
                len: s.len(),
                max: MAX,
            });
        }
        Ok(Self(s))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<const MAX: usize> TryFrom<String> for BoundedText<MAX> {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl<const MAX: usize> From<BoundedText<MAX>> for String {
    fn from(t: BoundedText<MAX>) -> Self {
        t.0
    }
}

impl<const MAX: usize> fmt::Display for BoundedText<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Free-text body of a sighting report.
pub type Note = BoundedText<4096>;

// --- Event enum: large variants boxed ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    /// Replaces endpoints, page geometry and cache sizes. Persisted reports
    /// and the title filter are kept.
    Configure(Box<Config>),

    /// Loads persisted reports and requests the current page.
    AppStarted,
    /// Loads persisted reports only.
    LoadReports,

    // Pagination
    GoToPage {
        page: u32,
    },
    Navigate(NavIntent),
    RetryPage,

    // Filter
    FilterChanged {
        query: String,
    },
    ClearFilter,

    // Detail
    OpenRecord {
        uid: RecordUid,
    },
    CloseRecord,
    RetryRecord,

    // Reports
    ReportSighting {
        uid: RecordUid,
        note: String,
    },
    DeleteReport {
        position: usize,
    },
    DeleteReportById {
        id: ReportId,
    },

    DismissError,

    // Capability responses (boxed to keep the enum small)
    PageFetched {
        page: u32,
        result: Box<Result<Page, FetchError>>,
    },
    RecordFetched {
        uid: RecordUid,
        result: Box<Result<Record, FetchError>>,
    },
    ReportsLoaded(Box<Result<Option<Vec<u8>>, String>>),
    ReportsWritten(Result<(), String>),
}
