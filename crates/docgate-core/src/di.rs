//! Collaborator container.
//!
//! Plugins obtain shared collaborators such as the data access layer or the
//! metadata cache from a [`Container`] when they are instantiated, instead of
//! reaching for global state.
//!
//! ```
//! use std::sync::Arc;
//! use docgate_core::Container;
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! struct Fixed;
//! impl Clock for Fixed {
//!     fn now(&self) -> u64 { 42 }
//! }
//!
//! let mut container = Container::new();
//! container.register::<dyn Clock>(Arc::new(Fixed));
//!
//! let clock = container.require::<dyn Clock>().unwrap();
//! assert_eq!(clock.now(), 42);
//! ```

use crate::error::{GateError, GateResult};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-keyed registry of shared collaborators.
///
/// Values are stored as `Arc<T>`; `T` may be unsized, so trait objects such as
/// `dyn DataAccess` can be registered and resolved directly.
#[derive(Default, Clone)]
pub struct Container {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: HashMap<TypeId, &'static str>,
}

impl Container {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collaborator, replacing any previous value of the same type.
    pub fn register<T>(&mut self, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        self.services.insert(id, Arc::new(service));
        self.names.insert(id, type_name::<T>());
    }

    /// Builder-style variant of [`Container::register`].
    #[must_use]
    pub fn with<T>(mut self, service: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(service);
        self
    }

    /// Returns the collaborator of type `T`, if registered.
    #[must_use]
    pub fn resolve<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Returns the collaborator of type `T` or a configuration error.
    pub fn require<T>(&self) -> GateResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<T>().ok_or_else(|| {
            GateError::configuration(format!(
                "required collaborator {} is not registered",
                type_name::<T>()
            ))
        })
    }

    /// Returns `true` if a collaborator of type `T` is registered.
    #[must_use]
    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered collaborators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names.values().collect();
        names.sort_unstable();
        f.debug_struct("Container").field("services", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync + std::fmt::Debug {
        fn greet(&self) -> String;
    }

    #[derive(Debug)]
    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_register_and_resolve_trait_object() {
        let mut container = Container::new();
        container.register::<dyn Greeter>(Arc::new(English));

        assert!(container.contains::<dyn Greeter>());
        let greeter = container.resolve::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn test_resolve_concrete_type() {
        let container = Container::new().with(Arc::new(41_u32));
        assert_eq!(container.resolve::<u32>().as_deref(), Some(&41));
        assert!(container.resolve::<u64>().is_none());
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_require_missing_is_configuration_error() {
        let container = Container::new();
        let err = container.require::<dyn Greeter>().unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Configuration);
        assert!(err.to_string().contains("Greeter"));
    }
}
