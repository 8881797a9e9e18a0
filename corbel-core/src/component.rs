// Constructor references for middleware, guards and interceptors

use std::sync::Arc;

/// An opaque reference to a pipeline component that is instantiated once,
/// when the owning controller is registered.
///
/// Controllers declare components by reference (usually `Ref::of::<T>()`);
/// the router engine turns each reference into a live instance and shares
/// that instance across every request to the route.
pub struct ComponentRef<T: ?Sized> {
    name: &'static str,
    factory: Arc<dyn Fn() -> Arc<T> + Send + Sync>,
}

impl<T: ?Sized> ComponentRef<T> {
    pub fn from_factory<F>(name: &'static str, factory: F) -> Self
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            name,
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn instantiate(&self) -> Arc<T> {
        (self.factory)()
    }
}

impl<T: ?Sized> Clone for ComponentRef<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            factory: self.factory.clone(),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for ComponentRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ComponentRef").field(&self.name).finish()
    }
}

/// Class-scope references first, then method-scope, each in declaration order.
pub fn compose<T: ?Sized>(
    class_scope: &[ComponentRef<T>],
    method_scope: &[ComponentRef<T>],
) -> Vec<ComponentRef<T>> {
    class_scope.iter().chain(method_scope).cloned().collect()
}
