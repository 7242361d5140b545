//! Reference async shell.
//!
//! Owns a [`Core`] and resolves its effects on a tokio runtime. Storage is
//! answered inline from a [`KeyValueStore`]; each HTTP request runs as one
//! task in a [`JoinSet`], and completions are resolved back into the core in
//! arrival order. Only the owner of the `Runtime` touches the core.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crux_core::{Core, Request};
use crux_http::protocol::{HttpRequest, HttpResult};
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::capabilities::{into_http_result, resolve_kv, HttpTransport, KeyValueStore, TransportError};
use crate::{App, Effect, Event, ViewModel};

pub struct Runtime<T> {
    core: Core<Effect, App>,
    transport: Arc<T>,
    kv: Arc<dyn KeyValueStore>,
    tasks: JoinSet<(u64, HttpResult)>,
    pending: HashMap<u64, Request<HttpRequest>>,
    next_request: u64,
    renders: u64,
}

impl<T: HttpTransport + 'static> Runtime<T> {
    pub fn new(transport: Arc<T>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            core: Core::new(),
            transport,
            kv,
            tasks: JoinSet::new(),
            pending: HashMap::new(),
            next_request: 0,
            renders: 0,
        }
    }

    /// Applies `event` and starts any requests it leads to. Must be called
    /// from within a tokio runtime.
    #[instrument(skip(self, event))]
    pub fn dispatch(&mut self, event: Event) {
        let effects = self.core.process_event(event);
        self.process(effects);
    }

    fn process(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Render(_) => self.renders += 1,
                Effect::KeyValue(mut request) => {
                    let output = resolve_kv(self.kv.as_ref(), &request.operation);
                    queue.extend(self.core.resolve(&mut request, output));
                }
                Effect::Http(request) => self.spawn_http(request),
            }
        }
    }

    fn spawn_http(&mut self, request: Request<HttpRequest>) {
        let id = self.next_request;
        self.next_request += 1;
        debug!(id, url = %request.operation.url, "spawning request");

        let operation = request.operation.clone();
        let transport = Arc::clone(&self.transport);
        self.pending.insert(id, request);

        // The inner task isolates a panicking transport; its join error
        // becomes an ordinary failed response.
        self.tasks.spawn(async move {
            let call = tokio::spawn(async move { transport.execute(operation).await });
            let result = match call.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(id, error = %e, "transport task failed");
                    Err(TransportError::InvalidResponse {
                        reason: format!("transport task failed: {e}"),
                    })
                }
            };
            (id, into_http_result(result))
        });
    }

    /// Waits for one request to complete and resolves it. Returns `false`
    /// when nothing is outstanding.
    pub async fn step(&mut self) -> bool {
        let Some(joined) = self.tasks.join_next().await else {
            return false;
        };
        match joined {
            Ok((id, result)) => match self.pending.remove(&id) {
                Some(mut request) => {
                    let effects = self.core.resolve(&mut request, result);
                    self.process(effects);
                }
                None => warn!(id, "completion for unknown request"),
            },
            Err(e) => warn!(error = %e, "request task lost"),
        }
        true
    }

    /// Resolves completions until no request is outstanding, including
    /// requests started by those completions.
    #[instrument(skip(self))]
    pub async fn settle(&mut self) {
        while self.step().await {}
    }

    pub fn view(&self) -> ViewModel {
        self.core.view()
    }

    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Number of render requests seen so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }
}
