//! Catalog endpoints and response decoding.
//!
//! The core never performs I/O: it builds the request URL, hands it to the
//! `Http` capability, and turns whatever comes back into [`Page`] or
//! [`Record`]. No retries here; retry policy belongs to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::capabilities::{TransportError, ValidatedUrl, DEFAULT_TIMEOUT_MS};
use crate::event::RecordUid;
use crate::record::{Page, RawPage, RawRecord, Record};

pub const DEFAULT_LIST_URL: &str = "https://api.fbi.gov/@wanted";
pub const DEFAULT_DETAIL_URL: &str = "https://api.fbi.gov/@wanted-person";
pub const DEFAULT_USER_AGENT: &str = concat!("wanted-core/", env!("CARGO_PKG_VERSION"));

/// What the `Http` capability hands back for one request.
pub type HttpOutcome = crux_http::Result<crux_http::Response<Vec<u8>>>;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
    /// Transport failure or non-2xx status. Retrying the same fetch may help.
    #[error("network error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// Payload did not fit the expected shape. Not retried automatically.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// The request URL could not be built from the configured endpoint.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network { .. })
    }
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::InvalidUrl { .. } | TransportError::InvalidRequest { .. } => {
                FetchError::InvalidRequest {
                    message: e.to_string(),
                }
            }
            other => FetchError::network(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub list_url: String,
    pub detail_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            list_url: DEFAULT_LIST_URL.to_string(),
            detail_url: DEFAULT_DETAIL_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CatalogConfig {
    /// `<list_url>?page=<n>&pageSize=<size>`
    ///
    /// # Errors
    ///
    /// Fails if the configured list endpoint is not a usable URL.
    pub fn page_url(&self, page: u32, page_size: u32) -> Result<ValidatedUrl, FetchError> {
        let url = ValidatedUrl::new(self.list_url.clone())?.with_query(&[
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ])?;
        Ok(url)
    }

    /// `<detail_url>/<uid>`, with the uid percent-encoded as one segment.
    ///
    /// # Errors
    ///
    /// Fails if the configured detail endpoint is not a usable URL.
    pub fn record_url(&self, uid: &RecordUid) -> Result<ValidatedUrl, FetchError> {
        let url = ValidatedUrl::new(self.detail_url.clone())?.with_path_segment(uid.as_str())?;
        Ok(url)
    }
}

/// Parses a list response body.
pub fn decode_page(page: u32, body: &[u8]) -> Result<Page, FetchError> {
    let raw: RawPage = serde_json::from_slice(body)
        .map_err(|e| FetchError::decode(format!("page {page}: {e}")))?;
    Ok(raw.normalize(page))
}

/// Parses a detail response body.
pub fn decode_record(uid: &RecordUid, body: &[u8]) -> Result<Record, FetchError> {
    let raw: RawRecord = serde_json::from_slice(body)
        .map_err(|e| FetchError::decode(format!("record {uid}: {e}")))?;
    raw.normalize()
        .ok_or_else(|| FetchError::decode(format!("record {uid}: payload has no uid")))
}

fn success_body(outcome: HttpOutcome) -> Result<Vec<u8>, FetchError> {
    let mut response = outcome.map_err(|e| FetchError::network(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let code = u16::from(status);
        return Err(FetchError::Network {
            status: Some(code),
            message: format!("server responded with status {code}"),
        });
    }
    Ok(response.take_body().unwrap_or_default())
}

/// Turns the answer to a page request into page data.
pub fn page_from_response(page: u32, outcome: HttpOutcome) -> Result<Page, FetchError> {
    let decoded = success_body(outcome).and_then(|body| decode_page(page, &body));
    match &decoded {
        Ok(p) => debug!(page, items = p.items.len(), total = p.total_count, "catalog page decoded"),
        Err(e) => warn!(page, error = %e, "catalog page request failed"),
    }
    decoded
}

/// Turns the answer to a detail request into a record.
pub fn record_from_response(uid: &RecordUid, outcome: HttpOutcome) -> Result<Record, FetchError> {
    let decoded = success_body(outcome).and_then(|body| decode_record(uid, &body));
    if let Err(e) = &decoded {
        warn!(%uid, error = %e, "catalog record request failed");
    }
    decoded
}
