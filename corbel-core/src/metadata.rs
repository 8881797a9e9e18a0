//! Metadata store
//!
//! A side table that associates declarative facts with a controller type or
//! one of its handlers. Controllers describe themselves once, at registration,
//! by writing into the store; the router engine reads the store back to build
//! its route table. Nothing is stored on controller instances.
//!
//! Values are keyed by `(kind, target)` where the target is a type identity
//! plus an optional member (handler) name. List kinds are appended to with
//! [`MetadataStore::append`]; singleton kinds are overwritten with
//! [`MetadataStore::define`].
//!
//! ```
//! use corbel_core::metadata::{kinds, MetadataStore, MetadataTarget};
//!
//! struct UsersController;
//!
//! let store = MetadataStore::new();
//! let class = MetadataTarget::class::<UsersController>();
//! store.define(kinds::CONTROLLER_PREFIX, "/users".to_string(), &class);
//! store.append(kinds::ROUTES, "first", &class);
//! store.append(kinds::ROUTES, "second", &class);
//!
//! assert_eq!(store.get::<String>(kinds::CONTROLLER_PREFIX, &class).as_deref(), Some("/users"));
//! assert_eq!(store.get_list::<&str>(kinds::ROUTES, &class), vec!["first", "second"]);
//! ```

use crate::logging::trace;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Well-known metadata kinds written by [`crate::ControllerDecl`].
pub mod kinds {
    pub const IS_CONTROLLER: &str = "is_controller";
    pub const CONTROLLER_PREFIX: &str = "controller_prefix";
    pub const ROUTES: &str = "routes";
    pub const MIDDLEWARE: &str = "middleware";
    pub const GUARDS: &str = "guards";
    pub const INTERCEPTORS: &str = "interceptors";
    pub const ROUTE_PARAMS: &str = "route_params";
    pub const ROUTE_HANDLER: &str = "route_handler";
    pub const HTTP_CODE: &str = "http_code";
    /// Set once a controller's declarations have been written to a store
    pub const DECLARED: &str = "declared";
}

/// A class, or a member of a class, that metadata is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataTarget {
    type_id: TypeId,
    type_name: &'static str,
    member: Option<String>,
}

impl MetadataTarget {
    pub fn class<C: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
            member: None,
        }
    }

    pub fn method<C: 'static>(member: impl Into<String>) -> Self {
        Self {
            member: Some(member.into()),
            ..Self::class::<C>()
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Side table of declarative facts keyed by `(kind, target)`.
#[derive(Default)]
pub struct MetadataStore {
    entries: RwLock<HashMap<(&'static str, MetadataTarget), Entry>>,
    init_lock: Mutex<()>,
}

static GLOBAL: Lazy<MetadataStore> = Lazy::new(MetadataStore::new);

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store.
    pub fn global() -> &'static MetadataStore {
        &GLOBAL
    }

    /// Store `value`, replacing whatever was stored under the same key.
    pub fn define<T>(&self, kind: &'static str, value: T, target: &MetadataTarget)
    where
        T: Any + Send + Sync,
    {
        trace!(kind, controller = target.type_name, member = ?target.member, "Defining metadata");
        self.entries
            .write()
            .insert((kind, target.clone()), Arc::new(value));
    }

    /// Push `value` onto the list stored under the key, creating it if absent.
    pub fn append<T>(&self, kind: &'static str, value: T, target: &MetadataTarget)
    where
        T: Any + Send + Sync + Clone,
    {
        let mut entries = self.entries.write();
        let key = (kind, target.clone());
        let mut list: Vec<T> = entries
            .get(&key)
            .and_then(|entry| entry.downcast_ref::<Vec<T>>())
            .cloned()
            .unwrap_or_default();
        list.push(value);
        entries.insert(key, Arc::new(list));
    }

    /// Stored value, or `None` if absent or stored with a different type.
    pub fn get<T>(&self, kind: &'static str, target: &MetadataTarget) -> Option<T>
    where
        T: Any + Send + Sync + Clone,
    {
        self.entries
            .read()
            .get(&(kind, target.clone()))
            .and_then(|entry| entry.downcast_ref::<T>())
            .cloned()
    }

    /// Stored list, or an empty list if nothing was appended.
    pub fn get_list<T>(&self, kind: &'static str, target: &MetadataTarget) -> Vec<T>
    where
        T: Any + Send + Sync + Clone,
    {
        self.get::<Vec<T>>(kind, target).unwrap_or_default()
    }

    /// Run `init` and then mark `kind` on `target`, unless it is already marked.
    ///
    /// Callers racing on the same store are serialized, so `init` runs at
    /// most once per `(kind, target)`. Returns whether `init` ran.
    pub fn define_once<F: FnOnce()>(&self, kind: &'static str, target: &MetadataTarget, init: F) -> bool {
        let _init = self.init_lock.lock();
        if self.has(kind, target) {
            return false;
        }
        init();
        self.define(kind, true, target);
        true
    }

    pub fn has(&self, kind: &'static str, target: &MetadataTarget) -> bool {
        self.entries.read().contains_key(&(kind, target.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Cats;
    struct Dogs;

    #[test]
    fn test_define_overwrites() {
        let store = MetadataStore::new();
        let target = MetadataTarget::class::<Cats>();
        store.define(kinds::CONTROLLER_PREFIX, "a".to_string(), &target);
        store.define(kinds::CONTROLLER_PREFIX, "b".to_string(), &target);
        assert_eq!(
            store.get::<String>(kinds::CONTROLLER_PREFIX, &target),
            Some("b".to_string())
        );
    }

    #[test]
    fn test_append_preserves_order() {
        let store = MetadataStore::new();
        let target = MetadataTarget::class::<Cats>();
        for i in 0..3 {
            store.append(kinds::ROUTES, i, &target);
        }
        assert_eq!(store.get_list::<i32>(kinds::ROUTES, &target), vec![0, 1, 2]);
    }

    #[test]
    fn test_define_once_runs_init_once_across_threads() {
        let store = Arc::new(MetadataStore::new());
        let target = MetadataTarget::class::<Cats>();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let target = target.clone();
                std::thread::spawn(move || {
                    store.define_once(kinds::DECLARED, &target, || {
                        store.append(kinds::ROUTES, "index", &target);
                    })
                })
            })
            .collect();

        let ran = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ran| *ran)
            .count();
        assert_eq!(ran, 1);
        assert_eq!(store.get_list::<&str>(kinds::ROUTES, &target), vec!["index"]);
    }

    #[test]
    fn test_missing_returns_sentinel() {
        let store = MetadataStore::new();
        let target = MetadataTarget::class::<Dogs>();
        assert!(store.get::<bool>(kinds::IS_CONTROLLER, &target).is_none());
        assert!(store.get_list::<String>(kinds::ROUTES, &target).is_empty());
        assert!(!store.has(kinds::ROUTES, &target));
    }

    #[test]
    fn test_wrong_type_reads_as_missing() {
        let store = MetadataStore::new();
        let target = MetadataTarget::class::<Cats>();
        store.define(kinds::HTTP_CODE, 201u16, &target);
        assert!(store.get::<String>(kinds::HTTP_CODE, &target).is_none());
        assert_eq!(store.get::<u16>(kinds::HTTP_CODE, &target), Some(201));
    }

    #[test]
    fn test_targets_are_isolated() {
        let store = MetadataStore::new();
        let cats = MetadataTarget::class::<Cats>();
        let cats_find = MetadataTarget::method::<Cats>("find");
        let dogs = MetadataTarget::class::<Dogs>();

        store.append(kinds::MIDDLEWARE, "class", &cats);
        store.append(kinds::MIDDLEWARE, "method", &cats_find);

        assert_eq!(store.get_list::<&str>(kinds::MIDDLEWARE, &cats), vec!["class"]);
        assert_eq!(store.get_list::<&str>(kinds::MIDDLEWARE, &cats_find), vec!["method"]);
        assert!(store.get_list::<&str>(kinds::MIDDLEWARE, &dogs).is_empty());
        assert_eq!(cats_find.member(), Some("find"));
    }
}
