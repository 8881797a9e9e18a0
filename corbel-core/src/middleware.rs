// Middleware system for request/response processing

use crate::component::ComponentRef;
use crate::exception_filter::ExceptionContext;
use crate::logging::{debug, info, trace, warn};
use crate::routing::ErrorHandlerFn;
use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Type alias for the next handler in the middleware chain
pub type Next = Box<dyn FnOnce(HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>> + Send>;

/// Terminal handler a middleware chain runs into
pub type HandlerFn =
    Arc<dyn Fn(HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>> + Send + Sync>;

/// A request-processing step that runs before the route handler.
///
/// Call `next(req)` to continue the chain. Returning a response without
/// calling `next` short-circuits it; returning `Err` hands the error to the
/// exception filter layer.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

pub type MiddlewareRef = ComponentRef<dyn Middleware>;

impl ComponentRef<dyn Middleware> {
    pub fn of<M: Middleware + Default + 'static>() -> Self {
        Self::new(M::default)
    }

    pub fn new<M, F>(factory: F) -> Self
    where
        M: Middleware + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        Self::from_factory(std::any::type_name::<M>(), move || {
            Arc::new(factory()) as Arc<dyn Middleware>
        })
    }
}

/// Middleware chain executor
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_middleware(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            middlewares: Arc::new(middlewares),
        }
    }

    /// Instantiate every reference, keeping their order.
    pub fn from_refs(refs: &[MiddlewareRef]) -> Self {
        Self::from_middleware(refs.iter().map(ComponentRef::instantiate).collect())
    }

    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        let mut mws = (*self.middlewares).clone();
        mws.push(Arc::new(middleware));
        self.middlewares = Arc::new(mws);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler, None).await
    }

    /// Execute the chain, answering a middleware failure through `on_error`
    /// at the layer that raised it.
    ///
    /// The error context is built from the request as that middleware received
    /// it, and the middleware wrapping it still see a response.
    pub async fn apply_with_errors(
        &self,
        req: HttpRequest,
        handler: HandlerFn,
        on_error: ErrorHandlerFn,
    ) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler, Some(on_error)).await
    }

    fn execute_from(
        &self,
        index: usize,
        req: HttpRequest,
        handler: HandlerFn,
        on_error: Option<ErrorHandlerFn>,
    ) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        if index >= self.middlewares.len() {
            trace!("Middleware chain complete, calling handler");
            handler(req)
        } else {
            let middleware = self.middlewares[index].clone();
            let chain = self.clone();

            trace!(middleware_index = index, "Executing middleware");
            Box::pin(async move {
                let ctx = on_error.as_ref().map(|_| ExceptionContext::from_request(&req));
                let inner_on_error = on_error.clone();
                let result = middleware
                    .handle(
                        req,
                        Box::new(move |req| chain.execute_from(index + 1, req, handler, inner_on_error)),
                    )
                    .await;

                match (result, on_error, ctx) {
                    (Err(err), Some(on_error), Some(ctx)) => {
                        debug!(middleware_index = index, error = %err, "Middleware failed");
                        Ok(on_error(err, ctx).await)
                    }
                    (result, _, _) => result,
                }
            })
        }
    }
}

// ========== Built-in Middleware ==========

/// Propagates `x-request-id`, generating one when the client sent none.
///
/// The id is written back onto the request so handlers and the exception
/// filter layer see it, and echoed on the response. Behind a [`Router`] with
/// an error hook, failures further down the chain arrive here as responses,
/// so error responses carry the header too.
///
/// [`Router`]: crate::Router
#[derive(Default)]
pub struct RequestIdMiddleware;

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let request_id = req
            .header("x-request-id")
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        req.headers
            .insert("x-request-id".to_string(), request_id.clone());

        let mut response = next(req).await?;
        response
            .headers
            .insert("x-request-id".to_string(), request_id);

        Ok(response)
    }
}

/// Logs each request and its outcome through `tracing`.
#[derive(Default)]
pub struct LoggerMiddleware;

#[async_trait]
impl Middleware for LoggerMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let start = std::time::Instant::now();
        let method = req.method.clone();
        let path = req.route_path().to_string();

        let result = next(req).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => info!(%method, %path, status = response.status, elapsed_ms, "Request completed"),
            Err(e) => warn!(%method, %path, error = %e, elapsed_ms, "Request failed"),
        }

        result
    }
}

/// CORS (Cross-Origin Resource Sharing) middleware
pub struct CorsMiddleware {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub max_age: u32,
}

impl CorsMiddleware {
    pub fn new() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, OPTIONS, PATCH".to_string(),
            allow_headers: "Content-Type, Authorization, Accept".to_string(),
            max_age: 86400,
        }
    }

    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.allow_origin = origin.to_string();
        self
    }
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        // Preflight never reaches the handler
        if req.method.eq_ignore_ascii_case("OPTIONS") {
            return Ok(HttpResponse::no_content()
                .with_header("Access-Control-Allow-Origin", self.allow_origin.clone())
                .with_header("Access-Control-Allow-Methods", self.allow_methods.clone())
                .with_header("Access-Control-Allow-Headers", self.allow_headers.clone())
                .with_header("Access-Control-Max-Age", self.max_age.to_string()));
        }

        let response = next(req).await?;
        Ok(response.with_header("Access-Control-Allow-Origin", self.allow_origin.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for Record {
        async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
            self.log.lock().push(self.name);
            next(req).await
        }
    }

    struct Deny;

    #[async_trait]
    impl Middleware for Deny {
        async fn handle(&self, _req: HttpRequest, _next: Next) -> Result<HttpResponse, Error> {
            Ok(HttpResponse::forbidden())
        }
    }

    fn handler(log: Arc<Mutex<Vec<&'static str>>>) -> HandlerFn {
        Arc::new(move |_req: HttpRequest| -> BoxFuture<'static, Result<HttpResponse, Error>> {
            let log = log.clone();
            Box::pin(async move {
                log.lock().push("handler");
                Ok(HttpResponse::ok())
            })
        })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        for name in ["A", "B", "C"] {
            chain.use_middleware(Record { name, log: log.clone() });
        }

        let response = chain
            .apply(HttpRequest::new("GET", "/"), handler(log.clone()))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(*log.lock(), vec!["A", "B", "C", "handler"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(Record { name: "A", log: log.clone() });
        chain.use_middleware(Deny);
        chain.use_middleware(Record { name: "C", log: log.clone() });

        let response = chain
            .apply(HttpRequest::new("GET", "/"), handler(log.clone()))
            .await
            .unwrap();
        assert_eq!(response.status, 403);
        assert_eq!(*log.lock(), vec!["A"]);
    }

    struct Fail;

    #[async_trait]
    impl Middleware for Fail {
        async fn handle(&self, _req: HttpRequest, _next: Next) -> Result<HttpResponse, Error> {
            Err(Error::Internal("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failure_is_answered_where_it_happens() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(RequestIdMiddleware);
        chain.use_middleware(Fail);
        chain.use_middleware(Record { name: "C", log: log.clone() });

        let on_error: ErrorHandlerFn = Arc::new(
            |err: Error, ctx: ExceptionContext| -> BoxFuture<'static, HttpResponse> {
                Box::pin(async move {
                    HttpResponse::new(err.status_code())
                        .with_body(ctx.request_id.unwrap_or_default().into_bytes())
                })
            },
        );
        let request = HttpRequest::new("GET", "/").with_header("x-request-id", "r-1");

        let response = chain
            .apply_with_errors(request.clone(), handler(log.clone()), on_error)
            .await
            .unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.body_string(), "r-1");
        assert_eq!(response.headers.get("x-request-id"), Some(&"r-1".to_string()));
        assert!(log.lock().is_empty());

        let result = chain.apply(request, handler(log.clone())).await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_request_id_generated_and_echoed() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(RequestIdMiddleware);
        let echo: HandlerFn = Arc::new(|req: HttpRequest| -> BoxFuture<'static, Result<HttpResponse, Error>> {
            Box::pin(async move {
                let id = req.header("x-request-id").cloned().unwrap_or_default();
                Ok(HttpResponse::ok().with_body(id.into_bytes()))
            })
        });

        let response = chain.apply(HttpRequest::new("GET", "/"), echo.clone()).await.unwrap();
        let id = response.headers.get("x-request-id").cloned().unwrap();
        assert_eq!(response.body_string(), id);

        let req = HttpRequest::new("GET", "/").with_header("X-Request-Id", "abc");
        let response = chain.apply(req, echo).await.unwrap();
        assert_eq!(response.body_string(), "abc");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let chain = MiddlewareChain::from_refs(&[MiddlewareRef::of::<CorsMiddleware>()]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let response = chain
            .apply(HttpRequest::new("OPTIONS", "/"), handler(log.clone()))
            .await
            .unwrap();
        assert_eq!(response.status, 204);
        assert!(log.lock().is_empty());
    }
}
