//! Process-wide single-instance-per-type store.
//!
//! Configure a connection once at startup, park it here, and retrieve it
//! later by type. The first write for a type wins; there is no replace
//! operation on the shared registry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::error::{ConfigError, Error};

static SHARED: Lazy<Registry> = Lazy::new(Registry::new);

/// A type-keyed store holding at most one live instance per concrete type.
#[derive(Default)]
pub struct Registry {
    entries: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Registry {
    /// An isolated registry (tests construct their own instead of tearing
    /// down the shared one).
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn shared() -> &'static Registry {
        &SHARED
    }

    /// Returns the stored instance of `T`.
    pub fn instance<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        let entries = self.lock();
        entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(entry).downcast::<T>().ok())
            .ok_or_else(|| ConfigError::MissingInstance(std::any::type_name::<T>()).into())
    }

    /// Stores `value` if no instance of `T` exists yet, then returns the
    /// stored instance. First writer wins; a later value is discarded in
    /// favor of the existing one. The check-and-insert runs under the
    /// registry lock, so concurrent first callers produce one write.
    pub fn instance_or<T: Send + Sync + 'static>(&self, value: T) -> Arc<T> {
        let mut entries = self.lock();
        let entry = entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(value));
        Arc::clone(entry)
            .downcast::<T>()
            .expect("registry entry stored under wrong type id")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TypeId, Arc<dyn Any + Send + Sync>>> {
        self.entries.lock().expect("registry lock poisoned")
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Widget(u32);

    #[test]
    fn test_instance_before_set_fails() {
        let registry = Registry::new();
        let result = registry.instance::<Widget>();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingInstance(_)))
        ));
    }

    #[test]
    fn test_same_instance_returned_each_time() {
        let registry = Registry::new();
        let first = registry.instance_or(Widget(1));
        let second = registry.instance::<Widget>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_first_writer_wins() {
        let registry = Registry::new();
        let first = registry.instance_or(Widget(1));
        let second = registry.instance_or(Widget(2));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, Widget(1));
    }

    #[test]
    fn test_types_do_not_collide() {
        #[derive(Debug)]
        struct Other;

        let registry = Registry::new();
        registry.instance_or(Widget(1));
        assert!(registry.instance::<Other>().is_err());
    }

    #[test]
    fn test_concurrent_first_write_stores_one_instance() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.instance_or(Widget(i)))
            })
            .collect();
        let stored: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for instance in &stored {
            assert!(Arc::ptr_eq(instance, &stored[0]));
        }
    }
}
