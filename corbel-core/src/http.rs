// HTTP request and response types

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// HTTP request wrapper
///
/// Header names are stored lowercase; lookups through [`HttpRequest::header`]
/// are case-insensitive.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: Vec::new(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
        }
    }

    pub fn from_parts(
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: Vec<u8>,
        path_params: HashMap<String, String>,
        query_params: HashMap<String, String>,
    ) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            method,
            path,
            headers,
            body,
            path_params,
            query_params,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Path without the query string.
    pub fn route_path(&self) -> &str {
        self.path
            .split_once('?')
            .map(|(p, _)| p)
            .unwrap_or(&self.path)
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Parse(e.to_string()))
    }

    /// The body as an untyped JSON value; `None` when the body is empty.
    pub fn body_value(&self) -> Result<Option<serde_json::Value>, crate::Error> {
        if self.body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        self.json().map(Some)
    }

    /// Get a path parameter by name
    pub fn param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_ascii_lowercase())
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn forbidden() -> Self {
        Self::new(403)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn body_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Parse(e.to_string()))
    }
}

#[derive(Debug)]
struct ResponseState {
    response: HttpResponse,
    sent: bool,
}

/// Shared, writable response for handlers and guards that answer the
/// request themselves.
///
/// Writing a body (`json`, `send`) or calling `end` marks the response as
/// sent; the engine then uses it verbatim instead of serializing the
/// handler's return value. Clones share the same underlying response.
#[derive(Debug, Clone)]
pub struct ResponseHandle {
    state: Arc<Mutex<ResponseState>>,
}

impl ResponseHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ResponseState {
                response: HttpResponse::ok(),
                sent: false,
            })),
        }
    }

    pub fn status(&self, status: impl Into<u16>) -> &Self {
        self.state.lock().response.status = status.into();
        self
    }

    pub fn header(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.state
            .lock()
            .response
            .headers
            .insert(key.into(), value.into());
        self
    }

    /// Serialize `value` as the body and mark the response sent.
    pub fn json<T: Serialize>(&self, value: &T) -> Result<(), crate::Error> {
        let body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        let mut state = self.state.lock();
        state
            .response
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        state.response.body = body;
        state.sent = true;
        Ok(())
    }

    pub fn send(&self, body: impl Into<Vec<u8>>) {
        let mut state = self.state.lock();
        state.response.body = body.into();
        state.sent = true;
    }

    /// Finish the response without a body.
    pub fn end(&self) {
        self.state.lock().sent = true;
    }

    pub fn is_sent(&self) -> bool {
        self.state.lock().sent
    }

    pub fn status_code(&self) -> u16 {
        self.state.lock().response.status
    }

    /// The written response, if anything was sent.
    pub fn sent_response(&self) -> Option<HttpResponse> {
        let state = self.state.lock();
        state.sent.then(|| state.response.clone())
    }
}

impl Default for ResponseHandle {
    fn default() -> Self {
        Self::new()
    }
}
