//! HTTP plumbing underneath the api client.
//!
//! [`HttpTransport`] is the seam between request building and the wire.
//! [`ReqwestTransport`] talks to a real backend; [`MockTransport`] answers
//! from a script and records what it was asked.

use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

pub use reqwest::header::{HeaderMap, HeaderValue};
pub use reqwest::Method;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Request body decoded as JSON, if there is one.
    pub fn json_body(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: default_reason(status).to_string(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, Vec::new())
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn default_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("")
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> AuthResult<HttpResponse>;
}

#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> AuthResult<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let mut builder = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        let status = response.status();
        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                debug!(%err, %url, "failed to read response body");
                Vec::new()
            }
        };
        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}

struct ScriptedReply {
    response: HttpResponse,
    delay: Option<Duration>,
}

/// Scripted in-process backend.
///
/// Replies are queued per method and path and served first in, first out.
/// Routes with nothing queued answer 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<ScriptedReply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, method: Method, path: &str, response: HttpResponse) {
        self.enqueue_delayed(method, path, response, None);
    }

    pub fn enqueue_json(&self, method: Method, path: &str, status: u16, body: Value) {
        self.enqueue(method, path, HttpResponse::json(status, &body));
    }

    pub fn enqueue_delayed(
        &self,
        method: Method,
        path: &str,
        response: HttpResponse,
        delay: Option<Duration>,
    ) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(ScriptedReply { response, delay });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }
}

fn route_key(method: Method, path: &str) -> String {
    format!("{method} {path}")
}

fn url_path(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> AuthResult<HttpResponse> {
        let key = (request.method.clone(), url_path(&request.url));
        self.requests.lock().push(request);
        let reply = self
            .routes
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => {
                if let Some(delay) = reply.delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(reply.response)
            }
            None => Ok(HttpResponse::json(
                404,
                &serde_json::json!({ "error": format!("no route for {} {}", key.0, key.1) }),
            )),
        }
    }
}
