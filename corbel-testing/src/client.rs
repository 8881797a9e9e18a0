// In-process test client

use crate::TestResponse;
use corbel_core::{
    Controller, Error, ExceptionFilterChain, HttpMethod, HttpRequest, MetadataStore, RouterEngine,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Sends requests straight into a [`RouterEngine`].
pub struct TestClient {
    engine: RouterEngine,
}

impl TestClient {
    pub fn new(engine: RouterEngine) -> Self {
        Self { engine }
    }

    /// Client over a fresh engine with its own metadata store, in development
    /// mode so error bodies carry details.
    pub fn isolated() -> Self {
        let engine = RouterEngine::with_store(Arc::new(MetadataStore::new()))
            .with_filters(ExceptionFilterChain::development());
        Self::new(engine)
    }

    pub fn register<C: Controller>(&mut self, controller: C, base_path: Option<&str>) -> Result<&mut Self, Error> {
        self.engine.register_controller(controller, base_path)?;
        Ok(self)
    }

    pub fn engine(&self) -> &RouterEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RouterEngine {
        &mut self.engine
    }

    pub fn get(&self, path: &str) -> TestRequestBuilder<'_> {
        self.request(HttpMethod::GET, path)
    }

    pub fn post(&self, path: &str) -> TestRequestBuilder<'_> {
        self.request(HttpMethod::POST, path)
    }

    pub fn put(&self, path: &str) -> TestRequestBuilder<'_> {
        self.request(HttpMethod::PUT, path)
    }

    pub fn patch(&self, path: &str) -> TestRequestBuilder<'_> {
        self.request(HttpMethod::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> TestRequestBuilder<'_> {
        self.request(HttpMethod::DELETE, path)
    }

    pub fn options(&self, path: &str) -> TestRequestBuilder<'_> {
        self.request(HttpMethod::OPTIONS, path)
    }

    pub fn head(&self, path: &str) -> TestRequestBuilder<'_> {
        self.request(HttpMethod::HEAD, path)
    }

    pub fn request(&self, method: HttpMethod, path: &str) -> TestRequestBuilder<'_> {
        TestRequestBuilder::new(&self.engine, method, path)
    }

    /// Dispatch a prebuilt request.
    pub async fn send(&self, request: HttpRequest) -> TestResponse {
        TestResponse::new(self.engine.handle(request).await)
    }
}

/// Builder for a single test request
pub struct TestRequestBuilder<'a> {
    engine: &'a RouterEngine,
    method: HttpMethod,
    path: String,
    headers: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: Vec<u8>,
}

impl<'a> TestRequestBuilder<'a> {
    fn new(engine: &'a RouterEngine, method: HttpMethod, path: &str) -> Self {
        Self {
            engine,
            method,
            path: path.to_string(),
            headers: HashMap::new(),
            query: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {}", token))
    }

    /// Append a query parameter; values are percent-encoded.
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `data` as the JSON body.
    ///
    /// A value that cannot be serialized leaves the body empty.
    pub fn json<T: Serialize>(mut self, data: &T) -> Self {
        self.body = serde_json::to_vec(data).unwrap_or_default();
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        self
    }

    pub fn build(self) -> HttpRequest {
        let path = if self.query.is_empty() {
            self.path
        } else {
            let encoded = serde_urlencoded::to_string(&self.query).unwrap_or_default();
            let separator = if self.path.contains('?') { '&' } else { '?' };
            format!("{}{}{}", self.path, separator, encoded)
        };

        HttpRequest::from_parts(
            self.method.as_str().to_string(),
            path,
            self.headers,
            self.body,
            HashMap::new(),
            HashMap::new(),
        )
    }

    pub async fn send(self) -> TestResponse {
        let engine = self.engine;
        TestResponse::new(engine.handle(self.build()).await)
    }
}
