//! Recording transport for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Records every request and answers through a closure.
pub(crate) struct FakeTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responder: Responder,
    delay: Option<Duration>,
}

impl FakeTransport {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            requests: Mutex::new(Vec::new()),
            responder: Box::new(responder),
            delay: None,
        }
    }

    /// Answer every request with the same status and JSON body
    pub(crate) fn always(status: u16, body: serde_json::Value) -> Self {
        Self::new(move |_| Ok(json_response(status, body.clone())))
    }

    /// Hold each response back, letting concurrent callers interleave
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn last_request(&self) -> HttpRequest {
        self.requests().pop().expect("at least one request")
    }

    pub(crate) fn count(&self, url_fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.url.contains(url_fragment))
            .count()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().expect("requests lock").push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&request)
    }
}

pub(crate) fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
    let status = StatusCode::from_u16(status).expect("valid status code");
    let body = if body.is_null() { String::new() } else { body.to_string() };
    HttpResponse::new(status, body)
}
