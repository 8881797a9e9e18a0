// Interceptors wrapping handler invocation

use crate::component::ComponentRef;
use crate::controller::Reply;
use crate::logging::{debug, info};
use crate::{Error, HttpRequest};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// The wrapped call: parameter resolution, the handler, and any inner interceptors
pub type CallNext = BoxFuture<'static, Result<Reply, Error>>;

/// Execution context passed to interceptors
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub request: HttpRequest,
    pub controller: &'static str,
    pub handler: String,
}

impl ExecutionContext {
    pub fn new(request: HttpRequest, controller: &'static str, handler: impl Into<String>) -> Self {
        Self {
            request,
            controller,
            handler: handler.into(),
        }
    }
}

/// Interceptor trait for before/after handler logic
///
/// Code before `next.await` runs before the handler; code after sees the
/// handler's result and may replace it or its error.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, context: &ExecutionContext, next: CallNext) -> Result<Reply, Error>;
}

pub type InterceptorRef = ComponentRef<dyn Interceptor>;

impl ComponentRef<dyn Interceptor> {
    pub fn of<I: Interceptor + Default + 'static>() -> Self {
        Self::new(I::default)
    }

    pub fn new<I, F>(factory: F) -> Self
    where
        I: Interceptor + 'static,
        F: Fn() -> I + Send + Sync + 'static,
    {
        Self::from_factory(std::any::type_name::<I>(), move || {
            Arc::new(factory()) as Arc<dyn Interceptor>
        })
    }
}

/// Nest `call` inside the interceptors; the first one is outermost.
pub fn wrap(
    interceptors: &[Arc<dyn Interceptor>],
    context: Arc<ExecutionContext>,
    call: CallNext,
) -> CallNext {
    interceptors.iter().rev().fold(call, |next, interceptor| {
        let interceptor = interceptor.clone();
        let context = context.clone();
        Box::pin(async move { interceptor.intercept(&context, next).await })
    })
}

/// Logging interceptor
#[derive(Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(&self, context: &ExecutionContext, next: CallNext) -> Result<Reply, Error> {
        let start = std::time::Instant::now();
        debug!(
            controller = context.controller,
            handler = %context.handler,
            path = %context.request.route_path(),
            "Invoking handler"
        );

        let result = next.await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(handler = %context.handler, elapsed_ms, "Handler completed"),
            Err(e) => info!(handler = %context.handler, elapsed_ms, error = %e, "Handler failed"),
        }

        result
    }
}

/// Transform interceptor for rewriting JSON replies
pub struct TransformInterceptor<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    transform: F,
}

impl<F> TransformInterceptor<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    pub fn new(transform: F) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl<F> Interceptor for TransformInterceptor<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    async fn intercept(&self, _context: &ExecutionContext, next: CallNext) -> Result<Reply, Error> {
        match next.await? {
            Reply::Json(value) => Ok(Reply::Json((self.transform)(value))),
            Reply::NoContent => Ok(Reply::NoContent),
        }
    }
}

/// Rewrites errors raised by the handler before they reach the filter layer
pub struct MapErrorInterceptor<F>
where
    F: Fn(Error) -> Error + Send + Sync,
{
    map: F,
}

impl<F> MapErrorInterceptor<F>
where
    F: Fn(Error) -> Error + Send + Sync,
{
    pub fn new(map: F) -> Self {
        Self { map }
    }
}

#[async_trait]
impl<F> Interceptor for MapErrorInterceptor<F>
where
    F: Fn(Error) -> Error + Send + Sync,
{
    async fn intercept(&self, _context: &ExecutionContext, next: CallNext) -> Result<Reply, Error> {
        next.await.map_err(&self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Trace {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor for Trace {
        async fn intercept(&self, _context: &ExecutionContext, next: CallNext) -> Result<Reply, Error> {
            self.log.lock().push(format!("{} before", self.name));
            let result = next.await;
            self.log.lock().push(format!("{} after", self.name));
            result
        }
    }

    fn context() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(HttpRequest::new("GET", "/"), "Test", "find"))
    }

    #[tokio::test]
    async fn test_wrap_nests_first_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Trace { name: "outer", log: log.clone() }),
            Arc::new(Trace { name: "inner", log: log.clone() }),
        ];

        let handler_log = log.clone();
        let call: CallNext = Box::pin(async move {
            handler_log.lock().push("handler".to_string());
            Ok(Reply::NoContent)
        });

        wrap(&interceptors, context(), call).await.unwrap();
        assert_eq!(
            *log.lock(),
            vec!["outer before", "inner before", "handler", "inner after", "outer after"]
        );
    }

    #[tokio::test]
    async fn test_transform_rewrites_json() {
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(TransformInterceptor::new(
            |value: Value| serde_json::json!({ "data": value }),
        ))];
        let call: CallNext = Box::pin(async { Ok(Reply::Json(serde_json::json!(1))) });

        let reply = wrap(&interceptors, context(), call).await.unwrap();
        assert!(matches!(reply, Reply::Json(v) if v == serde_json::json!({"data": 1})));
    }

    #[tokio::test]
    async fn test_map_error() {
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(MapErrorInterceptor::new(
            |e: Error| Error::ServiceUnavailable(e.to_string()),
        ))];
        let call: CallNext = Box::pin(async { Err(Error::Internal("db down".to_string())) });

        let err = wrap(&interceptors, context(), call).await.unwrap_err();
        assert_eq!(err.status_code(), 503);
    }
}
