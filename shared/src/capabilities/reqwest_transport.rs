use std::time::Duration;

use async_trait::async_trait;
use crux_http::protocol::{HttpRequest, HttpResponse};
use tracing::{debug, instrument};

use super::http::{HttpTransport, TransportError, ValidatedUrl};
use super::MAX_RESPONSE_BODY_SIZE;

/// [`HttpTransport`] backed by `reqwest`, used by the `wanted` binary.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout_ms: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, timeout_ms })
    }
}

/// Fails once a body is known or observed to exceed `max` bytes.
fn check_body_size(size: usize, max: usize) -> Result<(), TransportError> {
    if size > max {
        return Err(TransportError::ResponseTooLarge { size, max });
    }
    Ok(())
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = ValidatedUrl::new(request.url.clone())?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            TransportError::InvalidRequest {
                reason: format!("unsupported method {}: {e}", request.method),
            }
        })?;

        let mut builder = self.client.request(method, url.as_str());
        for header in &request.headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let mut response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                TransportError::ConnectionError {
                    host: url.host().to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        if let Some(declared) = response.content_length() {
            check_body_size(
                usize::try_from(declared).unwrap_or(usize::MAX),
                MAX_RESPONSE_BODY_SIZE,
            )?;
        }

        let status = response.status().as_u16();
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::InvalidResponse {
                reason: e.to_string(),
            })?
        {
            check_body_size(body.len() + chunk.len(), MAX_RESPONSE_BODY_SIZE)?;
            body.extend_from_slice(&chunk);
        }

        debug!(status, bytes = body.len(), "catalog response received");
        Ok(HttpResponse::status(status).body(body).build())
    }
}
