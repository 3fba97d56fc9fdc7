//! Concurrent rehydration of a catalog.
//!
//! The [`Resolver`] turns the descriptor list read from a file into live objects.
//! Every descriptor gets its own tokio task, so a slow reconnect never holds up the
//! others. The resolver only becomes resolvable once all of them have succeeded;
//! the first failure fails the whole restore.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::instrument;

use crate::environment::Environment;
use crate::error::{HibernateError, Result};
use crate::options::{FailurePolicy, RestoreOptions};
use crate::pickle::{LiveObject, PickleDescriptor};

/// Aggregate state of a resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    /// Rehydration has not finished (or not started).
    AwaitingAll,
    /// Every descriptor produced its live object.
    AllRehydrated,
    /// At least one descriptor failed. Terminal.
    OneFailed,
}

/// Maps catalog indices to rehydrated objects.
pub struct Resolver {
    catalog: Vec<PickleDescriptor>,
    env: Arc<Environment>,
    live: Vec<Option<LiveObject>>,
    state: ResolverState,
}

impl Resolver {
    /// Creates a resolver for `catalog`. Nothing runs until [`rehydrate_all`](Self::rehydrate_all).
    pub fn new(catalog: Vec<PickleDescriptor>, env: Arc<Environment>) -> Self {
        let live = vec![None; catalog.len()];
        Self {
            catalog,
            env,
            live,
            state: ResolverState::AwaitingAll,
        }
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Returns true if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Current aggregate state.
    pub fn state(&self) -> ResolverState {
        self.state
    }

    /// The catalog, in index order.
    pub fn descriptors(&self) -> &[PickleDescriptor] {
        &self.catalog
    }

    /// Rehydrates every descriptor concurrently.
    ///
    /// All tasks are spawned before any is awaited. Succeeds only if every one of
    /// them succeeds; otherwise returns the first failure observed and handles the
    /// tasks still running according to `options.failure_policy`.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned future
    /// aborts every task that has not finished yet.
    #[instrument(skip_all, fields(catalog_len = self.catalog.len()))]
    pub async fn rehydrate_all(mut self, options: RestoreOptions) -> Result<Self> {
        if self.state != ResolverState::AwaitingAll {
            return Err(HibernateError::Internal(format!(
                "rehydrate_all called on a resolver in state {:?}",
                self.state
            )));
        }

        let count = u32::try_from(self.catalog.len())
            .map_err(|_| HibernateError::Format("catalog exceeds u32::MAX entries".into()))?;

        let mut tasks: JoinSet<(u32, anyhow::Result<LiveObject>)> = JoinSet::new();
        let mut indices = HashMap::with_capacity(self.catalog.len());
        for (index, descriptor) in (0..count).zip(self.catalog.iter().cloned()) {
            self.env.listener().on_started(index, descriptor.kind());
            let env = Arc::clone(&self.env);
            let handle = tasks.spawn(async move {
                let result = descriptor.rehydrate(&env).await;
                (index, result)
            });
            indices.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, failure) = match joined {
                Ok((index, Ok(object))) => {
                    self.store(index, object)?;
                    continue;
                }
                Ok((index, Err(cause))) => {
                    (index, HibernateError::rehydration(index, self.kind_of(index), cause))
                }
                Err(join_error) => {
                    let Some(&index) = indices.get(&join_error.id()) else {
                        return Err(HibernateError::Internal(
                            "joined a rehydration task that was never spawned".into(),
                        ));
                    };
                    let reason = if join_error.is_panic() {
                        "rehydration task panicked"
                    } else {
                        "rehydration task was cancelled"
                    };
                    let cause = anyhow::anyhow!(reason);
                    (index, HibernateError::rehydration(index, self.kind_of(index), cause))
                }
            };

            self.state = ResolverState::OneFailed;
            self.env
                .listener()
                .on_failed(index, self.kind_of(index), &failure);
            tasks.abort_all();
            if options.failure_policy == FailurePolicy::Drain {
                let mut discarded = 0usize;
                while let Some(joined) = tasks.join_next().await {
                    // Finished before the abort reached it. Reported, then dropped here
                    // so its teardown runs before the failure is returned.
                    if let Ok((index, Ok(object))) = joined {
                        self.env.listener().on_discarded(index, self.kind_of(index));
                        drop(object);
                        discarded += 1;
                    }
                }
                tracing::debug!(discarded, "drained remaining rehydrations");
            }
            return Err(failure);
        }

        self.state = ResolverState::AllRehydrated;
        tracing::info!(count, "all pickles rehydrated");
        Ok(self)
    }

    /// Returns the live object produced by `catalog[index]`.
    ///
    /// Only valid once [`rehydrate_all`](Self::rehydrate_all) has succeeded; any
    /// earlier call is reported as [`HibernateError::Internal`].
    pub fn resolve(&self, index: u32) -> Result<LiveObject> {
        if self.state != ResolverState::AllRehydrated {
            return Err(HibernateError::Internal(format!(
                "capsule #{index} resolved while the resolver is {:?}",
                self.state
            )));
        }
        self.live
            .get(index as usize)
            .and_then(Option::as_ref)
            .cloned()
            .ok_or_else(|| {
                HibernateError::Format(format!(
                    "capsule #{index} outside catalog of {} entries",
                    self.catalog.len()
                ))
            })
    }

    fn store(&mut self, index: u32, object: LiveObject) -> Result<()> {
        let slot = self
            .live
            .get_mut(index as usize)
            .ok_or_else(|| HibernateError::Internal(format!("no slot for pickle #{index}")))?;
        if slot.is_some() {
            return Err(HibernateError::Internal(format!(
                "pickle #{index} rehydrated twice"
            )));
        }
        *slot = Some(object);
        let kind = self.kind_of(index);
        self.env.listener().on_rehydrated(index, kind);
        Ok(())
    }

    fn kind_of(&self, index: u32) -> &'static str {
        self.catalog
            .get(index as usize)
            .map_or("<unknown>", PickleDescriptor::kind)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("len", &self.catalog.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
