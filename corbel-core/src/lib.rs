// Core library for the corbel HTTP framework
// Controllers, the dispatch pipeline around their handlers, and the server

pub mod application;
pub mod component;
pub mod controller;
pub mod engine;
pub mod error;
pub mod exception_filter;
pub mod guard;
pub mod http;
pub mod interceptor;
pub mod logging;
pub mod metadata;
pub mod middleware;
pub mod params;
pub mod pipe;
pub mod routing;
pub mod status;

// Re-export commonly used types
pub use application::*;
pub use component::*;
pub use controller::*;
pub use engine::*;
pub use error::*;
pub use exception_filter::*;
pub use guard::*;
pub use http::*;
pub use interceptor::{
    CallNext, ExecutionContext, Interceptor, InterceptorRef, LoggingInterceptor,
    MapErrorInterceptor, TransformInterceptor,
};
pub use metadata::{MetadataStore, MetadataTarget};
pub use middleware::*;
pub use params::*;
pub use pipe::*;
pub use routing::{
    ErrorHandlerFn, HttpMethod, Route, RouteDescriptor, Router, combine_paths, sort_static_first,
};
pub use status::*;

pub use async_trait::async_trait;

/// Everything needed to declare and serve controllers.
pub mod prelude {
    pub use crate::application::Application;
    pub use crate::controller::{Controller, ControllerDecl, Reply, RouteDecl};
    pub use crate::engine::RouterEngine;
    pub use crate::error::{Error, FieldError};
    pub use crate::exception_filter::{ExceptionContext, ExceptionFilter, ExceptionFilterChain};
    pub use crate::guard::{Guard, GuardContext, GuardRef};
    pub use crate::http::{HttpRequest, HttpResponse, ResponseHandle};
    pub use crate::interceptor::{CallNext, ExecutionContext, Interceptor, InterceptorRef};
    pub use crate::middleware::{Middleware, MiddlewareRef, Next};
    pub use crate::params::{ArgValue, HandlerArgs, ParamDescriptor, ParamSource};
    pub use crate::pipe::{DefaultValuePipe, ParseBoolPipe, ParseIntPipe, Pipe, ValidationPipe};
    pub use crate::routing::HttpMethod;
    pub use crate::status::HttpStatus;
    pub use async_trait::async_trait;
}
