//! Scripted [`HttpClient`] for cache and mutation tests.
//!
//! Responses are keyed by method and path. One-shot responses queued with
//! [`MockHttpClient::respond_once`] are consumed first, in order; after that
//! the sticky response from [`MockHttpClient::respond`] is returned. Requests
//! to an unscripted route get a `404`.
//!
//! A route can be held with [`MockHttpClient::hold`]: requests to it are
//! recorded immediately but their responses are not delivered until
//! [`MockHttpClient::release`] is called. This is how tests keep a fetch or a
//! mutation in flight.

use futures::future::BoxFuture;
use marquee_core::environment::HttpClient;
use marquee_core::error::NetworkError;
use marquee_core::http::{HttpRequest, HttpResponse, Method};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

type Route = (Method, String);
type Scripted = Result<HttpResponse, NetworkError>;

#[derive(Default)]
struct Script {
    once: HashMap<Route, VecDeque<Scripted>>,
    sticky: HashMap<Route, Scripted>,
    gates: HashMap<Route, watch::Sender<bool>>,
    calls: Vec<HttpRequest>,
}

/// Mock HTTP collaborator
///
/// Clones share the same script and call log.
#[derive(Clone)]
pub struct MockHttpClient {
    script: Arc<Mutex<Script>>,
    call_count: Arc<watch::Sender<usize>>,
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHttpClient {
    /// Client with no scripted routes
    #[must_use]
    pub fn new() -> Self {
        let (call_count, _) = watch::channel(0);
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            call_count: Arc::new(call_count),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer every request to `method path` with `response`
    pub fn respond(&self, method: Method, path: &str, response: HttpResponse) {
        self.script()
            .sticky
            .insert((method, path.to_string()), Ok(response));
    }

    /// Fail every request to `method path` at the transport level
    pub fn fail(&self, method: Method, path: &str, error: NetworkError) {
        self.script()
            .sticky
            .insert((method, path.to_string()), Err(error));
    }

    /// Answer the next request to `method path` with `result`
    pub fn respond_once(&self, method: Method, path: &str, result: Result<HttpResponse, NetworkError>) {
        self.script()
            .once
            .entry((method, path.to_string()))
            .or_default()
            .push_back(result);
    }

    /// Hold responses for `method path` until [`MockHttpClient::release`]
    pub fn hold(&self, method: Method, path: &str) {
        let mut script = self.script();
        let gate = script
            .gates
            .entry((method, path.to_string()))
            .or_insert_with(|| watch::channel(true).0);
        gate.send_replace(false);
    }

    /// Deliver held responses for `method path`
    pub fn release(&self, method: Method, path: &str) {
        if let Some(gate) = self.script().gates.get(&(method, path.to_string())) {
            gate.send_replace(true);
        }
    }

    /// Every request received so far, in arrival order
    #[must_use]
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.script().calls.clone()
    }

    /// Number of requests received for `method path`
    #[must_use]
    pub fn call_count(&self, method: Method, path: &str) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    /// Wait until at least `count` requests have been received in total
    pub async fn wait_for_calls(&self, count: usize) {
        let mut receiver = self.call_count.subscribe();
        let _ = receiver.wait_for(|received| *received >= count).await;
    }

    fn answer(&self, request: &HttpRequest) -> (Scripted, Option<watch::Receiver<bool>>) {
        let mut script = self.script();
        let route = (request.method, request.path.clone());
        script.calls.push(request.clone());

        let result = script
            .once
            .get_mut(&route)
            .and_then(VecDeque::pop_front)
            .or_else(|| script.sticky.get(&route).cloned())
            .unwrap_or_else(|| {
                Ok(HttpResponse::with_status(
                    404,
                    json!({ "message": format!("no mock response for {} {}", request.method, request.path) }),
                ))
            });
        let gate = script.gates.get(&route).map(watch::Sender::subscribe);
        let received = script.calls.len();
        drop(script);

        self.call_count.send_replace(received);
        (result, gate)
    }
}

impl HttpClient for MockHttpClient {
    fn fetch(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, NetworkError>> {
        Box::pin(async move {
            let (result, gate) = self.answer(&request);
            if let Some(mut gate) = gate {
                let _ = gate.wait_for(|open| *open).await;
            }
            result
        })
    }
}
