//! Thread-scoped state reachable from `Live`'s serde impls.
//!
//! Serde gives `Serialize`/`Deserialize` no way to carry context, so the writer
//! installs its pickling session (and the deserializer its resolver) on the current
//! thread for exactly the duration of one encode or decode call. Outside that
//! window nothing is installed and `Live` refuses to serialize, which is also how
//! pickling stays disabled while the catalog itself is written.

use std::any::type_name;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{HibernateError, Result};
use crate::factory::PickleFactories;
use crate::pickle::{LiveObject, PickleDescriptor};
use crate::resolver::Resolver;

thread_local! {
    static PICKLING: RefCell<Option<PicklingSession>> = const { RefCell::new(None) };
    static RESOLVING: RefCell<Option<RestoreScope>> = const { RefCell::new(None) };
}

/// Catalog state of one write session.
#[derive(Default)]
pub(crate) struct PicklingSession {
    factories: PickleFactories,
    catalog: Vec<PickleDescriptor>,
    /// `Arc` address -> catalog index. Addresses stay valid because `pinned` keeps
    /// every substituted object alive until the session ends.
    seen: HashMap<usize, u32>,
    pinned: Vec<LiveObject>,
    error: Option<HibernateError>,
}

/// Catalog length before an object was encoded, used to undo a failed encode.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mark(usize);

impl PicklingSession {
    pub(crate) fn new(factories: PickleFactories) -> Self {
        Self {
            factories,
            ..Self::default()
        }
    }

    pub(crate) fn catalog_len(&self) -> usize {
        self.catalog.len()
    }

    pub(crate) fn mark(&self) -> Mark {
        Mark(self.catalog.len())
    }

    /// Drops every descriptor appended since `mark`.
    pub(crate) fn rollback(&mut self, mark: Mark) {
        self.catalog.truncate(mark.0);
        self.pinned.truncate(mark.0);
        self.seen.retain(|_, index| (*index as usize) < mark.0);
        self.error = None;
    }

    pub(crate) fn take_error(&mut self) -> Option<HibernateError> {
        self.error.take()
    }

    /// Ends the session and hands over the catalog in first-occurrence order.
    pub(crate) fn into_catalog(self) -> Vec<PickleDescriptor> {
        self.catalog
    }

    fn substitute(&mut self, object: LiveObject, type_name: &'static str) -> Result<u32> {
        let key = Arc::as_ptr(&object) as *const () as usize;
        if let Some(&index) = self.seen.get(&key) {
            tracing::trace!(index, type_name, "live object already pickled");
            return Ok(index);
        }

        let Some((factory, descriptor)) = self.factories.try_pickle(object.as_ref()) else {
            return Err(HibernateError::Unclaimed { type_name });
        };

        let index = u32::try_from(self.catalog.len())
            .map_err(|_| HibernateError::Internal("catalog exceeds u32::MAX entries".into()))?;
        tracing::debug!(index, factory, kind = descriptor.kind(), type_name, "pickled live object");

        self.catalog.push(descriptor);
        self.pinned.push(object);
        self.seen.insert(key, index);
        Ok(index)
    }
}

impl fmt::Debug for PicklingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PicklingSession")
            .field("factories", &self.factories)
            .field("catalog_len", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

struct RestoreScope {
    resolver: Arc<Resolver>,
    error: Option<HibernateError>,
}

/// Runs `f` with `session` installed as the current thread's pickling session.
///
/// Fails without running `f` when called from inside a factory of another
/// session on this thread, which is still substituting at that point.
pub(crate) fn pickling<R>(session: &mut PicklingSession, f: impl FnOnce() -> R) -> Result<R> {
    struct Installed<'s> {
        session: &'s mut PicklingSession,
        previous: Option<PicklingSession>,
    }

    impl Drop for Installed<'_> {
        fn drop(&mut self) {
            let current = PICKLING.with(|slot| {
                slot.try_borrow_mut()
                    .ok()
                    .and_then(|mut slot| std::mem::replace(&mut *slot, self.previous.take()))
            });
            if let Some(current) = current {
                *self.session = current;
            }
        }
    }

    let previous = PICKLING.with(|slot| {
        let Ok(mut slot) = slot.try_borrow_mut() else {
            return Err(HibernateError::Internal(
                "write session opened re-entrantly from a pickle factory".into(),
            ));
        };
        Ok(slot.replace(std::mem::take(session)))
    })?;
    let _installed = Installed { session, previous };
    Ok(f())
}

/// Runs `f` with `resolver` installed for capsule lookups.
///
/// Returns `f`'s result together with the first error raised by a capsule, which is
/// more precise than whatever the codec reports for it.
pub(crate) fn resolving<R>(
    resolver: &Arc<Resolver>,
    f: impl FnOnce() -> R,
) -> (R, Option<HibernateError>) {
    struct Installed<'e> {
        previous: Option<RestoreScope>,
        error: &'e mut Option<HibernateError>,
    }

    impl Drop for Installed<'_> {
        fn drop(&mut self) {
            let current = RESOLVING.with(|slot| slot.replace(self.previous.take()));
            *self.error = current.and_then(|scope| scope.error);
        }
    }

    let scope = RestoreScope {
        resolver: Arc::clone(resolver),
        error: None,
    };
    let mut error = None;
    let result = {
        let previous = RESOLVING.with(|slot| slot.replace(Some(scope)));
        let _installed = Installed {
            previous,
            error: &mut error,
        };
        f()
    };
    (result, error)
}

/// Called by `Live::serialize`: returns the catalog index standing in for `object`.
pub(crate) fn substitute(object: LiveObject, type_name: &'static str) -> Result<u32> {
    PICKLING.with(|slot| {
        let Ok(mut slot) = slot.try_borrow_mut() else {
            return Err(HibernateError::Internal(
                "live object serialized re-entrantly from a pickle factory".into(),
            ));
        };
        let Some(session) = slot.as_mut() else {
            return Err(HibernateError::Serialization(format!(
                "live object of type {type_name} serialized outside a write session"
            )));
        };
        session.substitute(object, type_name).inspect_err(|e| {
            if session.error.is_none() {
                session.error = Some(e.clone());
            }
        })
    })
}

/// Called by `Live::deserialize`: returns the rehydrated object behind `index`.
pub(crate) fn resolve<T: Send + Sync + 'static>(index: u32) -> Result<Arc<T>> {
    RESOLVING.with(|slot| {
        let Ok(mut slot) = slot.try_borrow_mut() else {
            return Err(HibernateError::Internal("capsule resolved re-entrantly".into()));
        };
        let Some(scope) = slot.as_mut() else {
            return Err(HibernateError::Serialization(format!(
                "capsule #{index} read outside a restore session"
            )));
        };
        let result = scope.resolver.resolve(index).and_then(|object| {
            object.downcast::<T>().map_err(|_| HibernateError::Dependency {
                kind: format!(
                    "{} (capsule #{index} rehydrated to a different type)",
                    type_name::<T>()
                ),
            })
        });
        result.inspect_err(|e| {
            if scope.error.is_none() {
                scope.error = Some(e.clone());
            }
        })
    })
}
