//! Override providers: transient values that replace loaded ones in memory.
//!
//! An [`OverrideChain`] asks each provider in order for a member's
//! environment name; the first answer wins. Overridden members are recorded
//! on the bundle so saves never write the override back to the document.
//!
//! Any `Fn(&str) -> Option<String>` closure is a provider, alongside
//! [`EnvProvider`](crate::EnvProvider) and [`Properties`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// A key/value source consulted while loading.
pub trait OverrideProvider: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

impl<F> OverrideProvider for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn lookup(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Ordered providers; the first `Some` answer wins.
#[derive(Clone, Default)]
pub struct OverrideChain {
    providers: Vec<Arc<dyn OverrideProvider>>,
}

impl OverrideChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider after the existing ones.
    pub fn with(mut self, provider: impl OverrideProvider + 'static) -> Self {
        self.push(provider);
        self
    }

    pub fn push(&mut self, provider: impl OverrideProvider + 'static) {
        self.providers.push(Arc::new(provider));
    }

    pub fn resolve(&self, key: &str) -> Option<String> {
        self.providers.iter().find_map(|p| p.lookup(key))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for OverrideChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideChain")
            .field("providers", &self.providers.len())
            .finish()
    }
}

/// Process-local key/value properties, settable at runtime.
///
/// Clones share the same map, so a handle kept by the application sees
/// lookups made through the registry's chain and vice versa.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.write().remove(key)
    }
}

impl OverrideProvider for Properties {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key)
    }
}
