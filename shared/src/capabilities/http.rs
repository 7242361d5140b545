use async_trait::async_trait;
use crux_http::protocol::{HttpRequest, HttpResponse, HttpResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_RESPONSE_BODY_SIZE: usize = 16 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedUrl {
    url: String,
    host: String,
}

impl ValidatedUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        let parsed = Self::parse(&url)?;
        Ok(Self::from_parsed(&parsed))
    }

    /// Appends query pairs, keeping the validation of the base URL.
    pub fn with_query(&self, pairs: &[(&str, String)]) -> Result<Self, TransportError> {
        let mut parsed = Self::parse(&self.url)?;
        {
            let mut query = parsed.query_pairs_mut();
            for (name, value) in pairs {
                query.append_pair(name, value);
            }
        }
        let next = Self::from_parsed(&parsed);
        if next.url.len() > MAX_URL_LENGTH {
            return Err(TransportError::InvalidUrl {
                url: truncate(&next.url),
                reason: format!("URL exceeds maximum length of {MAX_URL_LENGTH} bytes"),
            });
        }
        Ok(next)
    }

    /// Appends one percent-encoded path segment.
    pub fn with_path_segment(&self, segment: &str) -> Result<Self, TransportError> {
        let mut parsed = Self::parse(&self.url)?;
        parsed
            .path_segments_mut()
            .map_err(|()| TransportError::InvalidUrl {
                url: truncate(&self.url),
                reason: "URL cannot carry path segments".to_string(),
            })?
            .pop_if_empty()
            .push(segment);
        Ok(Self::from_parsed(&parsed))
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn from_parsed(parsed: &Url) -> Self {
        Self {
            url: parsed.to_string(),
            host: parsed.host_str().unwrap_or_default().to_lowercase(),
        }
    }

    fn parse(url: &str) -> Result<Url, TransportError> {
        if url.trim().is_empty() {
            return Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: "URL cannot be empty".to_string(),
            });
        }

        if url.len() > MAX_URL_LENGTH {
            return Err(TransportError::InvalidUrl {
                url: truncate(url),
                reason: format!("URL exceeds maximum length of {MAX_URL_LENGTH} bytes"),
            });
        }

        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: truncate(url),
            reason: e.to_string(),
        })?;

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(TransportError::InvalidUrl {
                url: truncate(url),
                reason: format!("invalid scheme '{scheme}', only 'http' and 'https' are allowed"),
            });
        }

        if parsed.host_str().is_none() {
            return Err(TransportError::InvalidUrl {
                url: truncate(url),
                reason: "URL must have a host".to_string(),
            });
        }

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(TransportError::InvalidUrl {
                url: truncate(url),
                reason: "credentials in URL are not allowed".to_string(),
            });
        }

        Ok(parsed)
    }
}

fn truncate(url: &str) -> String {
    if url.len() <= 100 {
        url.to_string()
    } else {
        let cut = (0..=100).rev().find(|i| url.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &url[..cut])
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("connection failed to {host}: {message}")]
    ConnectionError { host: String, message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("response body too large: {size} bytes exceeds maximum of {max} bytes")]
    ResponseTooLarge { size: usize, max: usize },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },
}

/// Answer handed back to the core for one [`HttpRequest`] effect.
pub fn into_http_result(result: Result<HttpResponse, TransportError>) -> HttpResult {
    match result {
        Ok(response) => HttpResult::Ok(response),
        Err(TransportError::Timeout { .. }) => HttpResult::Err(crux_http::HttpError::Timeout),
        Err(e) => HttpResult::Err(crux_http::HttpError::Io(e.to_string())),
    }
}

/// Executes the core's HTTP effects. Implemented by the shell.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
