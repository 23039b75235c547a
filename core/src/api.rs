use crate::error::{AuthError, AuthResult};
use crate::session::UserProfile;
use crate::transport::{HeaderMap, HeaderValue, HttpRequest, HttpResponse, HttpTransport, Method};
use reqwest::header::{IntoHeaderName, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            headers: HeaderMap::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a header, replacing any existing value under the same name.
    pub fn with_header(mut self, name: impl IntoHeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// JSON client bound to a single backend base URL.
#[derive(Clone)]
pub struct ApiClient {
    base: String,
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(base: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { base, transport }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Issue a JSON request, attaching `token` as a bearer credential.
    ///
    /// Bodies that are empty or not JSON come back as `{}`. Non-2xx statuses
    /// become [`AuthError::Request`].
    pub async fn auth_fetch(
        &self,
        token: Option<&str>,
        path: &str,
        options: RequestOptions,
    ) -> AuthResult<Value> {
        let mut headers = options.headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            headers.insert(AUTHORIZATION, bearer(token)?);
        }
        let body = options
            .body
            .map(|body| serde_json::to_vec(&body))
            .transpose()
            .map_err(|err| AuthError::Transport(format!("failed to encode body: {err}")))?;
        let request = HttpRequest {
            method: options.method,
            url: self.url_for(path),
            headers,
            body,
        };

        let response = self.transport.send(request).await?;
        let data = parse_body(path, &response);
        if !response.is_success() {
            return Err(AuthError::Request {
                status: response.status,
                message: error_message(&data, &response),
            });
        }
        Ok(data)
    }
}

fn bearer(token: &str) -> AuthResult<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|err| AuthError::Transport(format!("token is not a valid header value: {err}")))?;
    value.set_sensitive(true);
    Ok(value)
}

fn parse_body(path: &str, response: &HttpResponse) -> Value {
    if response.body.is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_slice(&response.body) {
        Ok(value) => value,
        Err(err) => {
            debug!(%err, path, status = response.status, "response body is not JSON");
            Value::Object(Map::new())
        }
    }
}

fn error_message(data: &Value, response: &HttpResponse) -> String {
    match data.get("error") {
        Some(Value::String(message)) if !message.is_empty() => return message.clone(),
        Some(Value::Null) | Some(Value::String(_)) | None => {}
        Some(other) => return other.to_string(),
    }
    if response.status_text.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        response.status_text.clone()
    }
}

/// Token and profile handed back by the login-style endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthGrant {
    pub token: String,
    pub user: UserProfile,
}

impl AuthGrant {
    pub fn from_body(body: &Value) -> AuthResult<Self> {
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::MalformedResponse("missing token".into()))?;
        let user = body
            .get("user")
            .filter(|user| !user.is_null())
            .ok_or_else(|| AuthError::MalformedResponse("missing user".into()))?;
        Ok(Self {
            token: token.to_string(),
            user: UserProfile::new(user.clone()),
        })
    }
}
