//! What a restore needs from the host process.
//!
//! An [`Environment`] resolves the pickle kinds named in a catalog back to
//! constructible types, carries shared services that rehydration code may need
//! (clients, credentials, runtimes), and reports progress to a [`TaskListener`].

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{HibernateError, Result};
use crate::format::CatalogEntry;
use crate::pickle::{Pickle, PickleDescriptor};

type DecodeFn = fn(&[u8]) -> Result<PickleDescriptor>;

/// Progress sink for rehydration. Logging only; it never influences the outcome.
pub trait TaskListener: Send + Sync {
    /// A descriptor's rehydration task was started.
    fn on_started(&self, _index: u32, _kind: &str) {}

    /// A descriptor produced its live object.
    fn on_rehydrated(&self, _index: u32, _kind: &str) {}

    /// A descriptor failed. The restore will fail with this error.
    fn on_failed(&self, _index: u32, _kind: &str, _error: &HibernateError) {}

    /// A descriptor finished after another one had already failed the restore.
    ///
    /// Its live object is dropped right after this call. Only reported under
    /// [`FailurePolicy::Drain`](crate::FailurePolicy::Drain); abandoned tasks are
    /// never joined.
    fn on_discarded(&self, _index: u32, _kind: &str) {}
}

/// Default listener: forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl TaskListener for TracingListener {
    fn on_started(&self, index: u32, kind: &str) {
        tracing::debug!(index, kind, "rehydration started");
    }

    fn on_rehydrated(&self, index: u32, kind: &str) {
        tracing::debug!(index, kind, "rehydration finished");
    }

    fn on_failed(&self, index: u32, kind: &str, error: &HibernateError) {
        tracing::warn!(index, kind, %error, "rehydration failed");
    }

    fn on_discarded(&self, index: u32, kind: &str) {
        tracing::debug!(index, kind, "discarding late rehydration");
    }
}

/// Type resolution, services and progress reporting for one restore.
pub struct Environment {
    kinds: HashMap<&'static str, DecodeFn>,
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    listener: Arc<dyn TaskListener>,
}

impl Environment {
    /// An environment that knows no pickle kinds and logs through `tracing`.
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
            services: HashMap::new(),
            listener: Arc::new(TracingListener),
        }
    }

    /// Makes pickles of kind `P::KIND` readable.
    ///
    /// Registering the same kind twice keeps the latest registration.
    pub fn with_pickle<P: Pickle>(mut self) -> Self {
        self.kinds.insert(P::KIND, PickleDescriptor::decode::<P>);
        self
    }

    /// Provides a shared service to rehydration code, keyed by its type.
    pub fn with_service<T: Any + Send + Sync>(mut self, service: Arc<T>) -> Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    /// Replaces the progress listener.
    pub fn with_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Returns true if `kind` can be decoded.
    pub fn knows(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Looks up a service by type.
    pub fn service<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let service = self.services.get(&TypeId::of::<T>())?;
        Arc::clone(service).downcast::<T>().ok()
    }

    /// Like [`service`](Self::service), but a missing service is an error a pickle
    /// can return straight from `rehydrate`.
    pub fn require<T: Any + Send + Sync>(&self) -> anyhow::Result<Arc<T>> {
        self.service::<T>()
            .ok_or_else(|| anyhow::anyhow!("service {} is not provided", type_name::<T>()))
    }

    /// The progress listener.
    pub fn listener(&self) -> &dyn TaskListener {
        self.listener.as_ref()
    }

    /// Resolves one raw catalog entry into a descriptor.
    pub(crate) fn decode(&self, entry: &CatalogEntry) -> Result<PickleDescriptor> {
        let decode = self
            .kinds
            .get(entry.kind.as_str())
            .ok_or_else(|| HibernateError::Dependency {
                kind: entry.kind.clone(),
            })?;
        decode(&entry.payload)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.kinds.keys().copied().collect();
        kinds.sort_unstable();
        f.debug_struct("Environment")
            .field("kinds", &kinds)
            .field("services", &self.services.len())
            .finish_non_exhaustive()
    }
}
