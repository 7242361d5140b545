//! Capabilities the core uses, and the shell-side pieces that answer them.
//!
//! The core only ever talks to Crux's `Http`, `KeyValue` and `Render`
//! capabilities. [`HttpTransport`] and [`KeyValueStore`] are what a shell
//! plugs in to resolve the resulting effects.

mod http;
mod kv;

#[cfg(feature = "cli")]
mod reqwest_transport;

pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

pub use self::http::{
    into_http_result, HttpTransport, TransportError, ValidatedUrl, DEFAULT_TIMEOUT_MS,
    MAX_RESPONSE_BODY_SIZE, MAX_TIMEOUT_MS,
};
pub use self::kv::{
    resolve as resolve_kv, FileKvStore, KeyValueStore, KvError, KvKey, MemoryKvStore,
    StorageErrorCode,
};

#[cfg(feature = "cli")]
pub use self::reqwest_transport::ReqwestTransport;

use crate::event::Event;
use crate::App;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub kv: KeyValue<Event>,
    pub render: Render<Event>,
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! Canned HTTP answers and a scripted transport.

    use super::*;
    use async_trait::async_trait;
    use crux_http::protocol::{HttpRequest, HttpResponse, HttpResult};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn http_ok(body: impl Into<Vec<u8>>) -> HttpResult {
        HttpResult::Ok(HttpResponse::ok().body(body.into()).build())
    }

    pub fn http_status(status: u16) -> HttpResult {
        HttpResult::Ok(HttpResponse::status(status).build())
    }

    #[derive(Debug, Default)]
    pub struct StubTransport {
        routes: Mutex<HashMap<String, Result<(u16, Vec<u8>), TransportError>>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl StubTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
            if let Ok(mut routes) = self.routes.lock() {
                routes.insert(url.to_string(), Ok((status, body.into())));
            }
            self
        }

        pub fn fail(self, url: &str, error: TransportError) -> Self {
            if let Ok(mut routes) = self.routes.lock() {
                routes.insert(url.to_string(), Err(error));
            }
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn seen_urls(&self) -> Vec<String> {
            self.seen.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl HttpTransport for StubTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.url.clone());
            }
            let routed = self
                .routes
                .lock()
                .ok()
                .and_then(|r| r.get(&request.url).cloned());
            match routed {
                Some(Ok((status, body))) => Ok(HttpResponse::status(status).body(body).build()),
                Some(Err(e)) => Err(e),
                None => Ok(HttpResponse::status(404).build()),
            }
        }
    }
}
