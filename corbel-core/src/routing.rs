// Routing: route descriptors, path joining, and the transport router

use crate::exception_filter::ExceptionContext;
use crate::logging::{debug, trace};
use crate::middleware::{HandlerFn, MiddlewareChain};
use crate::{Error, HttpRequest, HttpResponse};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// HTTP methods
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    HEAD,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            "HEAD" => Some(HttpMethod::HEAD),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::HEAD => "HEAD",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative record of one controller route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    /// Path relative to the controller prefix; may contain `:name` placeholders
    pub path: String,
    pub method: HttpMethod,
    pub handler_name: String,
}

impl RouteDescriptor {
    pub fn new(method: HttpMethod, path: impl Into<String>, handler_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            handler_name: handler_name.into(),
        }
    }

    /// Whether the path has a `:name` placeholder.
    ///
    /// Detection is purely syntactic; regex or wildcard segments are not
    /// recognised.
    pub fn is_dynamic(&self) -> bool {
        self.path.contains(':')
    }
}

/// Stable-sort so that every static route precedes every dynamic one.
///
/// Relative order inside each group is kept, so two dynamic routes that can
/// match the same URL are still tried in declaration order.
pub fn sort_static_first(routes: &mut [RouteDescriptor]) {
    routes.sort_by_key(RouteDescriptor::is_dynamic);
}

/// Join path segments with single `/` separators.
///
/// Each segment is trimmed of leading and trailing slashes and empty segments
/// are dropped; the result always starts with `/` and never ends with one
/// (except the root path itself).
pub fn combine_paths(segments: &[&str]) -> String {
    let joined = segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

/// Error hook installed on the router; answers routing and middleware failures.
pub type ErrorHandlerFn =
    Arc<dyn Fn(Error, ExceptionContext) -> BoxFuture<'static, HttpResponse> + Send + Sync>;

/// A bound route: method, full path, middleware and the terminal handler
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub middleware: MiddlewareChain,
    pub handler: HandlerFn,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Transport-level router.
///
/// Routes are tried in binding order and the first match wins. Binding the
/// same method and path twice replaces the earlier handler in place.
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
    error_handler: Option<ErrorHandlerFn>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `middleware` followed by `handler` at `(method, path)`.
    pub fn bind(
        &mut self,
        method: HttpMethod,
        path: impl Into<String>,
        middleware: MiddlewareChain,
        handler: HandlerFn,
    ) {
        self.add_route(Route {
            method,
            path: path.into(),
            middleware,
            handler,
        });
    }

    pub fn add_route(&mut self, route: Route) {
        if let Some(existing) = self
            .routes
            .iter_mut()
            .find(|r| r.method == route.method && r.path == route.path)
        {
            debug!(method = %route.method, path = %route.path, "Replacing existing route binding");
            *existing = route;
        } else {
            trace!(method = %route.method, path = %route.path, "Binding route");
            self.routes.push(route);
        }
    }

    pub fn set_error_handler(&mut self, handler: ErrorHandlerFn) {
        self.error_handler = Some(handler);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find a route that matches the request and run its chain.
    pub async fn route(&self, mut request: HttpRequest) -> Result<HttpResponse, Error> {
        let (path, query) = match request.path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (request.path.clone(), None),
        };

        if let Some(query) = query {
            request.query_params = parse_query_string(&query);
        }

        let method = HttpMethod::from_str(&request.method)
            .ok_or_else(|| Error::MethodNotAllowed(request.method.clone()))?;

        if let Some((route, params)) = self.find(method, &path) {
            request.path_params = params;
            return self.run(route, request).await;
        }

        // HEAD falls back to GET with the body dropped
        if method == HttpMethod::HEAD
            && let Some((route, params)) = self.find(HttpMethod::GET, &path)
        {
            request.path_params = params;
            let mut response = self.run(route, request).await?;
            response.body.clear();
            return Ok(response);
        }

        Err(Error::RouteNotFound(format!("{} {}", request.method, path)))
    }

    /// Route the request, passing any failure to the error hook.
    ///
    /// Middleware failures are answered inside the chain, so only routing
    /// errors reach the hook from here.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let ctx = ExceptionContext::from_request(&request);
        match self.route(request).await {
            Ok(response) => response,
            Err(err) => match &self.error_handler {
                Some(handler) => handler(err, ctx).await,
                None => HttpResponse::new(err.status_code())
                    .with_json(&serde_json::json!({
                        "statusCode": err.status_code(),
                        "message": err.to_string(),
                    }))
                    .unwrap_or_else(|_| HttpResponse::internal_server_error()),
            },
        }
    }

    async fn run(&self, route: &Route, request: HttpRequest) -> Result<HttpResponse, Error> {
        match &self.error_handler {
            Some(on_error) => {
                route
                    .middleware
                    .apply_with_errors(request, route.handler.clone(), on_error.clone())
                    .await
            }
            None => route.middleware.apply(request, route.handler.clone()).await,
        }
    }

    fn find(&self, method: HttpMethod, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| match_path(&route.path, path).map(|params| (route, params)))
    }
}

/// Match a route path pattern against a request path
/// Returns Some(params) if matched, None otherwise. Captured segments are
/// percent-decoded; a segment that does not decode to UTF-8 is kept raw.
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            let value = urlencoding::decode(path_part)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| path_part.to_string());
            params.insert(param_name.to_string(), value);
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}

/// Decode a query string; repeated keys keep the last value.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .unwrap_or_default()
        .into_iter()
        .collect()
}
