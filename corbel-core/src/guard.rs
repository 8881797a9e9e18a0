// Guards for route protection

use crate::component::ComponentRef;
use crate::logging::debug;
use crate::{Error, HttpRequest, HttpStatus, ResponseHandle};
use async_trait::async_trait;
use std::sync::Arc;

/// Execution context for guards
///
/// A guard denies a request by writing to `response` and returning
/// `Ok(false)`. If it returns `false` without writing anything, the request
/// is answered with 403 by the exception filter layer.
pub struct GuardContext {
    pub request: HttpRequest,
    pub response: ResponseHandle,
}

impl GuardContext {
    pub fn new(request: HttpRequest, response: ResponseHandle) -> Self {
        Self { request, response }
    }

    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.request.header(name)
    }

    pub fn get_param(&self, name: &str) -> Option<&String> {
        self.request.path_params.get(name)
    }

    /// Write a JSON denial and return `Ok(false)` for the caller to pass on.
    pub fn deny(&self, status: HttpStatus, message: &str) -> Result<bool, Error> {
        self.response.status(status).json(&serde_json::json!({
            "statusCode": status.code(),
            "error": status.reason(),
            "message": message,
        }))?;
        Ok(false)
    }
}

/// Guard trait for protecting routes
#[async_trait]
pub trait Guard: Send + Sync {
    /// Determine if the request can proceed
    async fn can_activate(&self, context: &GuardContext) -> Result<bool, Error>;
}

pub type GuardRef = ComponentRef<dyn Guard>;

impl ComponentRef<dyn Guard> {
    pub fn of<G: Guard + Default + 'static>() -> Self {
        Self::new(G::default)
    }

    pub fn new<G, F>(factory: F) -> Self
    where
        G: Guard + 'static,
        F: Fn() -> G + Send + Sync + 'static,
    {
        Self::from_factory(std::any::type_name::<G>(), move || {
            Arc::new(factory()) as Arc<dyn Guard>
        })
    }
}

/// Run guards in order, stopping at the first that does not pass.
pub async fn run_guards(guards: &[Arc<dyn Guard>], context: &GuardContext) -> Result<bool, Error> {
    for (index, guard) in guards.iter().enumerate() {
        if !guard.can_activate(context).await? {
            debug!(guard_index = index, path = %context.request.route_path(), "Guard denied request");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Token verification capability consumed by [`BearerTokenGuard`].
///
/// Signature checking and claim decoding live outside the framework; plug in
/// whatever JWT or opaque-token backend the application uses.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<serde_json::Value, Error>;
}

/// Authentication guard - requires a bearer token the verifier accepts
pub struct BearerTokenGuard {
    verifier: Arc<dyn TokenVerifier>,
}

impl BearerTokenGuard {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl Guard for BearerTokenGuard {
    async fn can_activate(&self, context: &GuardContext) -> Result<bool, Error> {
        let token = match context
            .get_header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(token) if !token.trim().is_empty() => token.trim(),
            _ => return context.deny(HttpStatus::Unauthorized, "Missing bearer token"),
        };

        match self.verifier.verify(token).await {
            Ok(_claims) => Ok(true),
            Err(e) => {
                debug!(error = %e, "Token rejected");
                context.deny(HttpStatus::Unauthorized, "Invalid or expired token")
            }
        }
    }
}

/// API key guard
pub struct ApiKeyGuard {
    valid_keys: Vec<String>,
}

impl ApiKeyGuard {
    pub fn new(keys: Vec<String>) -> Self {
        Self { valid_keys: keys }
    }
}

#[async_trait]
impl Guard for ApiKeyGuard {
    async fn can_activate(&self, context: &GuardContext) -> Result<bool, Error> {
        match context.get_header("x-api-key") {
            Some(key) if self.valid_keys.contains(key) => Ok(true),
            Some(_) => context.deny(HttpStatus::Forbidden, "Invalid API key"),
            None => context.deny(HttpStatus::Unauthorized, "Missing API key"),
        }
    }
}

/// Guard built from a synchronous predicate
pub struct FnGuard<F>
where
    F: Fn(&GuardContext) -> Result<bool, Error> + Send + Sync,
{
    predicate: F,
}

impl<F> FnGuard<F>
where
    F: Fn(&GuardContext) -> Result<bool, Error> + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<F> Guard for FnGuard<F>
where
    F: Fn(&GuardContext) -> Result<bool, Error> + Send + Sync,
{
    async fn can_activate(&self, context: &GuardContext) -> Result<bool, Error> {
        (self.predicate)(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedVerifier(&'static str);

    #[async_trait]
    impl TokenVerifier for FixedVerifier {
        async fn verify(&self, token: &str) -> Result<serde_json::Value, Error> {
            if token == self.0 {
                Ok(serde_json::json!({"sub": "user-1"}))
            } else {
                Err(Error::Token("bad signature".to_string()))
            }
        }
    }

    fn context(request: HttpRequest) -> GuardContext {
        GuardContext::new(request, ResponseHandle::new())
    }

    #[tokio::test]
    async fn test_bearer_guard_accepts_valid_token() {
        let guard = BearerTokenGuard::new(Arc::new(FixedVerifier("good")));
        let ctx = context(HttpRequest::new("GET", "/").with_header("Authorization", "Bearer good"));
        assert!(guard.can_activate(&ctx).await.unwrap());
        assert!(!ctx.response.is_sent());
    }

    #[tokio::test]
    async fn test_bearer_guard_writes_401() {
        let guard = BearerTokenGuard::new(Arc::new(FixedVerifier("good")));

        let ctx = context(HttpRequest::new("GET", "/"));
        assert!(!guard.can_activate(&ctx).await.unwrap());
        assert_eq!(ctx.response.status_code(), 401);

        let ctx = context(HttpRequest::new("GET", "/").with_header("Authorization", "Bearer bad"));
        assert!(!guard.can_activate(&ctx).await.unwrap());
        let body: serde_json::Value = ctx.response.sent_response().unwrap().body_json().unwrap();
        assert_eq!(body["message"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_api_key_guard() {
        let guard = ApiKeyGuard::new(vec!["k1".to_string()]);

        let ctx = context(HttpRequest::new("GET", "/").with_header("X-Api-Key", "k1"));
        assert!(guard.can_activate(&ctx).await.unwrap());

        let ctx = context(HttpRequest::new("GET", "/").with_header("X-Api-Key", "nope"));
        assert!(!guard.can_activate(&ctx).await.unwrap());
        assert_eq!(ctx.response.status_code(), 403);
    }

    #[tokio::test]
    async fn test_run_guards_stops_at_first_denial() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = calls.clone();
        let guards: Vec<Arc<dyn Guard>> = vec![
            Arc::new(FnGuard::new(|_| Ok(false))),
            Arc::new(FnGuard::new(move |_| {
                counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(true)
            })),
        ];

        let ctx = context(HttpRequest::new("GET", "/"));
        assert!(!run_guards(&guards, &ctx).await.unwrap());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
