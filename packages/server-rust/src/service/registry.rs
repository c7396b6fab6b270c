use std::sync::Arc;

use dashmap::DashMap;
use ferrule_core::{ClassifiedError, InputType, OperationDescriptor};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Registry of operation descriptors, keyed by operation name.
///
/// Each entry carries the input factory the binder uses, resolved once at
/// registration. Lookups of unregistered names fail with
/// `ClassifiedError::UnknownOperation` before anything is attempted.
pub struct OperationRegistry {
    /// Name-based lookup: operation name -> descriptor.
    by_name: DashMap<String, Arc<OperationDescriptor>>,
    /// Registration order, for listings.
    order: RwLock<Vec<String>>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers an operation whose input is the `serde` request struct `T`.
    pub fn register<T>(&self, name: &str)
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        self.insert(OperationDescriptor::for_dto::<T>(name));
    }

    /// Registers an operation with a custom input factory.
    pub fn register_with(&self, name: &str, input: Arc<dyn InputType>) {
        self.insert(OperationDescriptor::new(name, input));
    }

    fn insert(&self, descriptor: OperationDescriptor) {
        let name = descriptor.name().to_string();
        if name.is_empty() {
            tracing::warn!("ignoring operation registration with an empty name");
            return;
        }
        if self
            .by_name
            .insert(name.clone(), Arc::new(descriptor))
            .is_none()
        {
            self.order.write().push(name);
        }
    }

    /// Looks up a registered operation.
    ///
    /// # Errors
    ///
    /// Returns `ClassifiedError::UnknownOperation` when `name` is not registered.
    pub fn get(&self, name: &str) -> Result<Arc<OperationDescriptor>, ClassifiedError> {
        self.by_name
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClassifiedError::UnknownOperation {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
