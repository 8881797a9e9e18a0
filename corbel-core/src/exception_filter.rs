//! Exception filters
//!
//! Every error raised while serving a request ends up here and is turned
//! into a JSON response; nothing escapes to the transport.
//!
//! The default mapping classifies the error by [`Error::kind`]:
//!
//! - declared exceptions keep their own status and message,
//! - recognized shapes (parse, type, validation, token) use a fixed table,
//! - anything else becomes a 500, masked in production mode.
//!
//! User filters registered on the [`ExceptionFilterChain`] run first, highest
//! priority first, and the first one returning `Some` wins.
//!
//! ```
//! use async_trait::async_trait;
//! use corbel_core::exception_filter::{ExceptionContext, ExceptionFilter, ExceptionFilterChain};
//! use corbel_core::{Error, HttpRequest, HttpResponse};
//!
//! struct Teapot;
//!
//! #[async_trait]
//! impl ExceptionFilter for Teapot {
//!     async fn catch(&self, _error: &Error, _ctx: &ExceptionContext) -> Option<HttpResponse> {
//!         Some(HttpResponse::new(418))
//!     }
//!
//!     fn handles(&self) -> Option<Vec<&'static str>> {
//!         Some(vec!["Conflict"])
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let chain = ExceptionFilterChain::new().add_filter(Teapot);
//! let ctx = ExceptionContext::from_request(&HttpRequest::new("GET", "/"));
//! let response = chain.handle(&Error::Conflict("taken".into()), &ctx).await;
//! assert_eq!(response.status, 418);
//! # });
//! ```

use crate::logging::{debug, error, warn};
use crate::status::reason_phrase;
use crate::{Error, ErrorKind, FieldError, HttpRequest, HttpResponse};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Context information passed to exception filters.
#[derive(Debug, Clone)]
pub struct ExceptionContext {
    /// Request path without the query string
    pub path: String,
    pub method: String,
    /// Value of the `x-request-id` header, if any
    pub request_id: Option<String>,
    pub production_mode: bool,
}

impl ExceptionContext {
    pub fn from_request(request: &HttpRequest) -> Self {
        Self {
            path: request.route_path().to_string(),
            method: request.method.clone(),
            request_id: request.header("x-request-id").cloned(),
            production_mode: false,
        }
    }

    pub fn with_production_mode(mut self, production: bool) -> Self {
        self.production_mode = production;
        self
    }
}

/// Trait for exception filters that catch and transform errors.
#[async_trait]
pub trait ExceptionFilter: Send + Sync + 'static {
    /// Return `Some` to answer the request, `None` to pass to the next filter.
    async fn catch(&self, error: &Error, ctx: &ExceptionContext) -> Option<HttpResponse>;

    /// Error variant names (see [`Error::name`]) this filter handles; `None` for all.
    fn handles(&self) -> Option<Vec<&'static str>> {
        None
    }

    /// Higher runs earlier.
    fn priority(&self) -> i32 {
        0
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The structured error body every default error response carries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub timestamp: String,
    pub path: String,
    pub method: String,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
}

impl ErrorBody {
    pub fn from_error(err: &Error, ctx: &ExceptionContext) -> Self {
        let status = err.status_code();
        let verbose = !ctx.production_mode;
        Self {
            status_code: status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            path: ctx.path.clone(),
            method: ctx.method.clone(),
            error: reason_phrase(status).to_string(),
            message: err.public_message(ctx.production_mode),
            request_id: ctx.request_id.clone(),
            details: err
                .field_errors()
                .filter(|_| verbose)
                .map(|fields| fields.to_vec()),
            stack: verbose.then(|| err.diagnostic_chain()),
        }
    }

    pub fn into_response(self) -> HttpResponse {
        let status = self.status_code;
        HttpResponse::new(status)
            .with_json(&self)
            .unwrap_or_else(|_| HttpResponse::new(status))
    }
}

/// Ordered exception filters plus the default mapping.
#[derive(Clone)]
pub struct ExceptionFilterChain {
    filters: Vec<Arc<dyn ExceptionFilter>>,
    production_mode: bool,
}

impl ExceptionFilterChain {
    /// Empty chain in production mode.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            production_mode: true,
        }
    }

    pub fn production() -> Self {
        Self::new()
    }

    /// Empty chain that exposes internal messages, field details and diagnostic traces.
    pub fn development() -> Self {
        Self {
            production_mode: false,
            ..Self::new()
        }
    }

    pub fn with_production_mode(mut self, production: bool) -> Self {
        self.production_mode = production;
        self
    }

    pub fn is_production(&self) -> bool {
        self.production_mode
    }

    pub fn add_filter<F: ExceptionFilter>(self, filter: F) -> Self {
        self.add_filter_arc(Arc::new(filter))
    }

    pub fn add_filter_arc(mut self, filter: Arc<dyn ExceptionFilter>) -> Self {
        self.filters.push(filter);
        self.filters.sort_by_key(|f| std::cmp::Reverse(f.priority()));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Map `err` to a response. Always produces one.
    pub async fn handle(&self, err: &Error, ctx: &ExceptionContext) -> HttpResponse {
        let ctx = ctx.clone().with_production_mode(self.production_mode);
        let error_type = err.name();

        match err.kind() {
            ErrorKind::Unclassified => {
                error!(error_type, error = %err, path = %ctx.path, method = %ctx.method, "Unhandled error")
            }
            _ if err.is_server_error() => {
                warn!(error_type, error = %err, path = %ctx.path, "Request failed")
            }
            _ => debug!(error_type, status = err.status_code(), path = %ctx.path, "Request rejected"),
        }

        for filter in &self.filters {
            if let Some(handled) = filter.handles()
                && !handled.contains(&error_type)
            {
                continue;
            }

            if let Some(response) = filter.catch(err, &ctx).await {
                debug!(filter = filter.name(), error_type, "Exception caught by filter");
                return response;
            }
        }

        ErrorBody::from_error(err, &ctx).into_response()
    }
}

impl Default for ExceptionFilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExceptionFilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionFilterChain")
            .field("filters", &self.filters.iter().map(|f| f.name().to_string()).collect::<Vec<_>>())
            .field("production_mode", &self.production_mode)
            .finish()
    }
}

/// Not found exception filter with custom messaging.
#[derive(Default)]
pub struct NotFoundExceptionFilter {
    custom_message: Option<String>,
}

impl NotFoundExceptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.custom_message = Some(message.into());
        self
    }
}

#[async_trait]
impl ExceptionFilter for NotFoundExceptionFilter {
    async fn catch(&self, error: &Error, ctx: &ExceptionContext) -> Option<HttpResponse> {
        let mut body = ErrorBody::from_error(error, ctx);
        if let Some(message) = &self.custom_message {
            body.message = message.clone();
        }
        Some(body.into_response())
    }

    fn handles(&self) -> Option<Vec<&'static str>> {
        Some(vec!["NotFound", "RouteNotFound"])
    }

    fn priority(&self) -> i32 {
        50
    }

    fn name(&self) -> &str {
        "NotFoundExceptionFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn ctx() -> ExceptionContext {
        let req = HttpRequest::new("POST", "/users/1?x=y").with_header("X-Request-Id", "req-9");
        ExceptionContext::from_request(&req)
    }

    async fn render(chain: &ExceptionFilterChain, err: Error) -> (u16, Value) {
        let response = chain.handle(&err, &ctx()).await;
        (response.status, response.body_json().unwrap())
    }

    #[tokio::test]
    async fn test_unclassified_error_body() {
        let (status, body) = render(
            &ExceptionFilterChain::development(),
            Error::other(std::io::Error::other("boom")),
        )
        .await;

        assert_eq!(status, 500);
        assert_eq!(body["statusCode"], 500);
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["message"], "boom");
        assert_eq!(body["path"], "/users/1");
        assert_eq!(body["method"], "POST");
        assert_eq!(body["requestId"], "req-9");
        assert!(body["timestamp"].is_string());
        assert!(body["stack"].is_array());
    }

    #[tokio::test]
    async fn test_production_masks_and_drops_stack() {
        let (status, body) = render(
            &ExceptionFilterChain::production(),
            Error::other(std::io::Error::other("password=hunter2")),
        )
        .await;

        assert_eq!(status, 500);
        assert_eq!(body["message"], "Internal server error");
        assert!(body.get("stack").is_none());
    }

    #[tokio::test]
    async fn test_validation_details_only_in_development() {
        let (status, body) = render(
            &ExceptionFilterChain::development(),
            Error::validation("email", "is required"),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["details"][0]["field"], "email");

        let (_, body) = render(
            &ExceptionFilterChain::production(),
            Error::validation("email", "is required"),
        )
        .await;
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_declared_error_keeps_status() {
        let (status, body) = render(
            &ExceptionFilterChain::production(),
            Error::http(crate::HttpStatus::Conflict, "already exists"),
        )
        .await;
        assert_eq!(status, 409);
        assert_eq!(body["statusCode"], 409);
        assert_eq!(body["error"], "Conflict");
        assert_eq!(body["message"], "already exists");
    }

    #[tokio::test]
    async fn test_filters_respect_handles_and_priority() {
        let chain = ExceptionFilterChain::new()
            .add_filter(NotFoundExceptionFilter::new().with_message("nothing here"));

        let (status, body) = render(&chain, Error::RouteNotFound("GET /x".to_string())).await;
        assert_eq!(status, 404);
        assert_eq!(body["message"], "nothing here");

        let (status, body) = render(&chain, Error::Forbidden("no".to_string())).await;
        assert_eq!(status, 403);
        assert_eq!(body["message"], "no");
    }
}
