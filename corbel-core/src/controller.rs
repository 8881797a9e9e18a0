//! Controller declarations
//!
//! A controller describes its routes once by implementing
//! [`Controller::declare`]. The [`ControllerDecl`] builder writes every fact
//! into a [`MetadataStore`]; the router engine reads them back when the
//! controller is registered.
//!
//! ```
//! use corbel_core::prelude::*;
//! use std::sync::Arc;
//!
//! struct UsersController;
//!
//! impl Controller for UsersController {
//!     fn declare(d: &mut ControllerDecl<'_, Self>) {
//!         d.controller("/users");
//!         d.get("/:id", "find_one", |_this: Arc<Self>, args| async move {
//!             Reply::json(&serde_json::json!({ "id": args.str(0) }))
//!         })
//!         .param(ParamDescriptor::path(0, "id"));
//!     }
//! }
//! ```

use crate::guard::GuardRef;
use crate::interceptor::InterceptorRef;
use crate::logging::trace;
use crate::metadata::{MetadataStore, MetadataTarget, kinds};
use crate::middleware::MiddlewareRef;
use crate::params::{HandlerArgs, ParamDescriptor};
use crate::routing::{HttpMethod, RouteDescriptor};
use crate::Error;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// What a handler returns on success.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Serialized as the response body with the route's success status
    Json(Value),
    /// 204 with an empty body
    NoContent,
}

impl Reply {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        serde_json::to_value(value)
            .map(Reply::Json)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Json(value)
    }
}

/// Type-erased handler method of controller `C`.
pub type RouteHandler<C> =
    Arc<dyn Fn(Arc<C>, HandlerArgs) -> BoxFuture<'static, Result<Reply, Error>> + Send + Sync>;

/// A type whose methods are mounted as HTTP routes.
pub trait Controller: Send + Sync + Sized + 'static {
    fn declare(decl: &mut ControllerDecl<'_, Self>);
}

/// Run `C::declare` against `store` unless it already ran there.
pub fn declare_controller<C: Controller>(store: &MetadataStore) {
    let class = MetadataTarget::class::<C>();
    store.define_once(kinds::DECLARED, &class, || {
        C::declare(&mut ControllerDecl::new(store));
    });
}

/// Class-level declaration builder.
pub struct ControllerDecl<'s, C> {
    store: &'s MetadataStore,
    class: MetadataTarget,
    _controller: PhantomData<fn() -> C>,
}

impl<'s, C: Controller> ControllerDecl<'s, C> {
    pub fn new(store: &'s MetadataStore) -> Self {
        Self {
            store,
            class: MetadataTarget::class::<C>(),
            _controller: PhantomData,
        }
    }

    /// Mark the type as a controller mounted under `prefix` (may be empty).
    pub fn controller(&mut self, prefix: &str) -> &mut Self {
        self.store.define(kinds::IS_CONTROLLER, true, &self.class);
        self.store
            .define(kinds::CONTROLLER_PREFIX, prefix.to_string(), &self.class);
        self
    }

    /// Class-scope middleware, run before every route's own middleware.
    pub fn use_middleware(&mut self, middleware: MiddlewareRef) -> &mut Self {
        self.store.append(kinds::MIDDLEWARE, middleware, &self.class);
        self
    }

    pub fn use_guard(&mut self, guard: GuardRef) -> &mut Self {
        self.store.append(kinds::GUARDS, guard, &self.class);
        self
    }

    pub fn use_interceptor(&mut self, interceptor: InterceptorRef) -> &mut Self {
        self.store.append(kinds::INTERCEPTORS, interceptor, &self.class);
        self
    }

    /// Declare a route served by `handler`.
    ///
    /// Routes are recorded in declaration order; identical routes are not
    /// merged.
    pub fn route<F, Fut>(
        &mut self,
        method: HttpMethod,
        path: &str,
        handler_name: &str,
        handler: F,
    ) -> RouteDecl<'s, C>
    where
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
    {
        trace!(%method, path, handler = handler_name, "Declaring route");
        self.store.append(
            kinds::ROUTES,
            RouteDescriptor::new(method, path, handler_name),
            &self.class,
        );

        let target = MetadataTarget::method::<C>(handler_name);
        let handler: RouteHandler<C> = Arc::new(
            move |controller: Arc<C>, args: HandlerArgs| -> BoxFuture<'static, Result<Reply, Error>> {
                Box::pin(handler(controller, args))
            },
        );
        self.store.define(kinds::ROUTE_HANDLER, handler, &target);

        RouteDecl {
            store: self.store,
            target,
            _controller: PhantomData,
        }
    }

    pub fn get<F, Fut>(&mut self, path: &str, handler_name: &str, handler: F) -> RouteDecl<'s, C>
    where
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
    {
        self.route(HttpMethod::GET, path, handler_name, handler)
    }

    pub fn post<F, Fut>(&mut self, path: &str, handler_name: &str, handler: F) -> RouteDecl<'s, C>
    where
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
    {
        self.route(HttpMethod::POST, path, handler_name, handler)
    }

    pub fn put<F, Fut>(&mut self, path: &str, handler_name: &str, handler: F) -> RouteDecl<'s, C>
    where
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
    {
        self.route(HttpMethod::PUT, path, handler_name, handler)
    }

    pub fn patch<F, Fut>(&mut self, path: &str, handler_name: &str, handler: F) -> RouteDecl<'s, C>
    where
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
    {
        self.route(HttpMethod::PATCH, path, handler_name, handler)
    }

    pub fn delete<F, Fut>(&mut self, path: &str, handler_name: &str, handler: F) -> RouteDecl<'s, C>
    where
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
    {
        self.route(HttpMethod::DELETE, path, handler_name, handler)
    }

    pub fn options<F, Fut>(&mut self, path: &str, handler_name: &str, handler: F) -> RouteDecl<'s, C>
    where
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
    {
        self.route(HttpMethod::OPTIONS, path, handler_name, handler)
    }

    pub fn head<F, Fut>(&mut self, path: &str, handler_name: &str, handler: F) -> RouteDecl<'s, C>
    where
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
    {
        self.route(HttpMethod::HEAD, path, handler_name, handler)
    }
}

/// Method-level declaration builder returned by [`ControllerDecl::route`].
pub struct RouteDecl<'s, C> {
    store: &'s MetadataStore,
    target: MetadataTarget,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Controller> RouteDecl<'_, C> {
    pub fn param(self, descriptor: ParamDescriptor) -> Self {
        self.store.append(kinds::ROUTE_PARAMS, descriptor, &self.target);
        self
    }

    /// Method-scope middleware, run after the class-scope chain.
    pub fn middleware(self, middleware: MiddlewareRef) -> Self {
        self.store.append(kinds::MIDDLEWARE, middleware, &self.target);
        self
    }

    pub fn guard(self, guard: GuardRef) -> Self {
        self.store.append(kinds::GUARDS, guard, &self.target);
        self
    }

    pub fn interceptor(self, interceptor: InterceptorRef) -> Self {
        self.store.append(kinds::INTERCEPTORS, interceptor, &self.target);
        self
    }

    /// Success status used when the handler returns [`Reply::Json`].
    pub fn http_code(self, status: impl Into<u16>) -> Self {
        self.store.define(kinds::HTTP_CODE, status.into(), &self.target);
        self
    }
}
