//! Router engine
//!
//! Turns declared controllers into bound routes. For every route of a
//! registered controller the engine:
//!
//! 1. joins base path, controller prefix and route path,
//! 2. composes class and method middleware, guards and interceptors,
//! 3. binds `[middleware..., endpoint]` on the transport [`Router`].
//!
//! Routes are bound static-first so `/items/custom` is matched before
//! `/items/:id` whatever the declaration order. The endpoint runs guards,
//! interceptors, parameter resolution and the handler, then serializes the
//! reply; any error is mapped by the [`ExceptionFilterChain`].

use crate::component::compose;
use crate::controller::{Controller, Reply, RouteHandler, declare_controller};
use crate::exception_filter::{ExceptionContext, ExceptionFilter, ExceptionFilterChain};
use crate::guard::{Guard, GuardContext, GuardRef, run_guards};
use crate::interceptor::{self, CallNext, ExecutionContext, Interceptor, InterceptorRef};
use crate::logging::{debug, info, warn};
use crate::metadata::{MetadataStore, MetadataTarget, kinds};
use crate::middleware::{HandlerFn, MiddlewareChain, MiddlewareRef};
use crate::params::{
    MAX_PARAM_INDEX, ParamDescriptor, duplicate_indices, needs_body, resolve_with_pipes,
};
use crate::routing::{HttpMethod, RouteDescriptor, Router, combine_paths, sort_static_first};
use crate::{Error, HttpRequest, HttpResponse, HttpStatus, ResponseHandle};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::Arc;

type SharedFilters = Arc<RwLock<ExceptionFilterChain>>;

enum StoreRef {
    Global,
    Owned(Arc<MetadataStore>),
}

impl StoreRef {
    fn get(&self) -> &MetadataStore {
        match self {
            StoreRef::Global => MetadataStore::global(),
            StoreRef::Owned(store) => store,
        }
    }
}

/// What the engine keeps about one registered controller.
#[derive(Debug, Clone)]
pub struct ControllerRegistration {
    pub controller: &'static str,
    pub prefix: String,
    pub base_path: String,
    /// Routes in binding order (static first)
    pub routes: Vec<RouteDescriptor>,
    pub class_middleware: Vec<MiddlewareRef>,
    /// `(method, full path)` for each bound route, parallel to `routes`
    pub mounted: Vec<(HttpMethod, String)>,
}

/// Orchestrates controller registration onto a [`Router`].
pub struct RouterEngine {
    store: StoreRef,
    router: Router,
    filters: SharedFilters,
    registrations: Vec<ControllerRegistration>,
}

impl RouterEngine {
    /// Engine reading declarations from the process-wide store.
    pub fn new() -> Self {
        Self::build(StoreRef::Global)
    }

    /// Engine with its own metadata store.
    pub fn with_store(store: Arc<MetadataStore>) -> Self {
        Self::build(StoreRef::Owned(store))
    }

    fn build(store: StoreRef) -> Self {
        let filters: SharedFilters = Arc::new(RwLock::new(ExceptionFilterChain::new()));
        let mut router = Router::new();

        let hook_filters = filters.clone();
        router.set_error_handler(Arc::new(move |err: Error, ctx: ExceptionContext| -> BoxFuture<'static, HttpResponse> {
            let chain = hook_filters.read().clone();
            Box::pin(async move { chain.handle(&err, &ctx).await })
        }));

        Self {
            store,
            router,
            filters,
            registrations: Vec::new(),
        }
    }

    pub fn store(&self) -> &MetadataStore {
        self.store.get()
    }

    /// Replace the exception filter chain for every route, bound or not.
    pub fn set_filters(&mut self, chain: ExceptionFilterChain) {
        *self.filters.write() = chain;
    }

    pub fn with_filters(mut self, chain: ExceptionFilterChain) -> Self {
        self.set_filters(chain);
        self
    }

    pub fn use_filter<F: ExceptionFilter>(&mut self, filter: F) {
        let mut chain = self.filters.write();
        *chain = chain.clone().add_filter(filter);
    }

    pub fn set_production_mode(&mut self, production: bool) {
        let mut chain = self.filters.write();
        *chain = chain.clone().with_production_mode(production);
    }

    pub fn filters(&self) -> ExceptionFilterChain {
        self.filters.read().clone()
    }

    /// Mount every route of `controller`, optionally below `base_path`.
    ///
    /// The instance becomes the singleton shared by all requests to this
    /// controller. Fails if the controller never declared itself or a route
    /// has no handler.
    pub fn register_controller<C: Controller>(
        &mut self,
        controller: C,
        base_path: Option<&str>,
    ) -> Result<(), Error> {
        let controller_name = std::any::type_name::<C>();
        let base_path = base_path.unwrap_or("").to_string();

        let store = self.store.get();
        declare_controller::<C>(store);

        let class = MetadataTarget::class::<C>();
        if store.get::<bool>(kinds::IS_CONTROLLER, &class) != Some(true) {
            return Err(Error::InvalidMetadata(format!(
                "{controller_name} is not declared as a controller"
            )));
        }

        let prefix = store
            .get::<String>(kinds::CONTROLLER_PREFIX, &class)
            .unwrap_or_default();
        let mut routes = store.get_list::<RouteDescriptor>(kinds::ROUTES, &class);
        sort_static_first(&mut routes);

        let class_middleware = store.get_list::<MiddlewareRef>(kinds::MIDDLEWARE, &class);
        let class_guards = store.get_list::<GuardRef>(kinds::GUARDS, &class);
        let class_interceptors = store.get_list::<InterceptorRef>(kinds::INTERCEPTORS, &class);

        let instance = Arc::new(controller);
        let mut bindings = Vec::with_capacity(routes.len());

        for route in &routes {
            let target = MetadataTarget::method::<C>(route.handler_name.as_str());
            let handler = store
                .get::<RouteHandler<C>>(kinds::ROUTE_HANDLER, &target)
                .ok_or_else(|| {
                    Error::InvalidMetadata(format!(
                        "{controller_name}::{} has a route but no handler",
                        route.handler_name
                    ))
                })?;

            let params = store.get_list::<ParamDescriptor>(kinds::ROUTE_PARAMS, &target);
            if let Some(param) = params.iter().find(|p| p.index >= MAX_PARAM_INDEX) {
                return Err(Error::InvalidMetadata(format!(
                    "{controller_name}::{} declares argument index {}, the limit is {}",
                    route.handler_name,
                    param.index,
                    MAX_PARAM_INDEX - 1
                )));
            }
            for index in duplicate_indices(&params) {
                warn!(
                    controller = controller_name,
                    handler = %route.handler_name,
                    index,
                    "Several parameters share one argument index; the last declared wins"
                );
            }

            let middleware = MiddlewareChain::from_refs(&compose(
                &class_middleware,
                &store.get_list::<MiddlewareRef>(kinds::MIDDLEWARE, &target),
            ));
            let guards = compose(&class_guards, &store.get_list::<GuardRef>(kinds::GUARDS, &target))
                .iter()
                .map(GuardRef::instantiate)
                .collect();
            let interceptors = compose(
                &class_interceptors,
                &store.get_list::<InterceptorRef>(kinds::INTERCEPTORS, &target),
            )
            .iter()
            .map(InterceptorRef::instantiate)
            .collect();

            let endpoint = Arc::new(Endpoint {
                controller: controller_name,
                handler_name: route.handler_name.clone(),
                instance: instance.clone(),
                handler,
                params,
                guards,
                interceptors,
                success_status: store
                    .get::<u16>(kinds::HTTP_CODE, &target)
                    .unwrap_or(HttpStatus::Ok.code()),
                filters: self.filters.clone(),
            });

            let full_path = combine_paths(&[&base_path, &prefix, &route.path]);
            bindings.push((route.method, full_path, middleware, endpoint.into_handler()));
        }

        let mut mounted = Vec::with_capacity(bindings.len());
        for (method, path, middleware, handler) in bindings {
            info!(controller = controller_name, %method, %path, "Mapped route");
            self.router.bind(method, path.clone(), middleware, handler);
            mounted.push((method, path));
        }

        self.registrations.push(ControllerRegistration {
            controller: controller_name,
            prefix,
            base_path,
            routes,
            class_middleware,
            mounted,
        });
        Ok(())
    }

    /// The transport router. Always the same instance.
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registrations(&self) -> &[ControllerRegistration] {
        &self.registrations
    }

    /// Dispatch one request through the bound routes.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        self.router.handle(request).await
    }
}

impl Default for RouterEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RouterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEngine")
            .field("routes", &self.router.routes().len())
            .field("controllers", &self.registrations.len())
            .finish()
    }
}

/// Terminal step bound for one controller route.
struct Endpoint<C> {
    controller: &'static str,
    handler_name: String,
    instance: Arc<C>,
    handler: RouteHandler<C>,
    params: Vec<ParamDescriptor>,
    guards: Vec<Arc<dyn Guard>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    success_status: u16,
    filters: SharedFilters,
}

impl<C: Controller> Endpoint<C> {
    fn into_handler(self: Arc<Self>) -> HandlerFn {
        Arc::new(move |request: HttpRequest| -> BoxFuture<'static, Result<HttpResponse, Error>> {
            let endpoint = self.clone();
            Box::pin(async move { Ok(endpoint.dispatch(request).await) })
        })
    }

    /// Errors are mapped here, with the request as the middleware left it.
    async fn dispatch(self: Arc<Self>, request: HttpRequest) -> HttpResponse {
        let ctx = ExceptionContext::from_request(&request);
        match self.clone().run(request).await {
            Ok(response) => response,
            Err(err) => {
                let chain = self.filters.read().clone();
                chain.handle(&err, &ctx).await
            }
        }
    }

    async fn run(self: Arc<Self>, request: HttpRequest) -> Result<HttpResponse, Error> {
        let response = ResponseHandle::new();

        if !self.guards.is_empty() {
            let guard_ctx = GuardContext::new(request.clone(), response.clone());
            if !run_guards(&self.guards, &guard_ctx).await? {
                return response
                    .sent_response()
                    .ok_or_else(|| Error::Forbidden("Forbidden resource".to_string()));
            }
        }

        debug!(
            controller = self.controller,
            handler = %self.handler_name,
            "Dispatching to handler"
        );

        let exec_ctx = Arc::new(ExecutionContext::new(
            request.clone(),
            self.controller,
            self.handler_name.clone(),
        ));
        let call: CallNext = {
            let endpoint = self.clone();
            let response = response.clone();
            Box::pin(async move {
                let body = if needs_body(&endpoint.params) {
                    request.body_value()?
                } else {
                    None
                };
                let args = resolve_with_pipes(&endpoint.params, &request, body.as_ref(), &response)?;
                (endpoint.handler)(endpoint.instance.clone(), args).await
            })
        };

        let reply = interceptor::wrap(&self.interceptors, exec_ctx, call).await?;

        // The handler answered through the response handle
        if let Some(sent) = response.sent_response() {
            return Ok(sent);
        }

        match reply {
            Reply::NoContent => Ok(HttpResponse::no_content()),
            Reply::Json(value) => HttpResponse::new(self.success_status).with_json(&value),
        }
    }
}
