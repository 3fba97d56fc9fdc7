//! Pluggable substitution strategies.
//!
//! The writer offers every [`Live`](crate::Live) value it meets to an ordered list
//! of [`PickleFactory`] strategies. The first one that returns a descriptor wins,
//! so when two factories could claim the same object the one registered first is used.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::pickle::{Pickle, PickleDescriptor};

/// A strategy that either declines an object or describes it durably.
pub trait PickleFactory: Send + Sync {
    /// Returns a descriptor for `object`, or `None` to let the next factory try.
    fn try_pickle(&self, object: &(dyn Any + Send + Sync)) -> Option<PickleDescriptor>;
}

impl<F> PickleFactory for F
where
    F: Fn(&(dyn Any + Send + Sync)) -> Option<PickleDescriptor> + Send + Sync,
{
    fn try_pickle(&self, object: &(dyn Any + Send + Sync)) -> Option<PickleDescriptor> {
        self(object)
    }
}

/// Claims every object of concrete type `T` and maps it to a pickle `P`.
pub struct TypedFactory<T, P, F> {
    describe: F,
    _marker: PhantomData<fn(&T) -> P>,
}

impl<T, P, F> TypedFactory<T, P, F>
where
    T: Any,
    P: Pickle,
    F: Fn(&T) -> P + Send + Sync,
{
    /// Creates a factory from a describing function.
    pub fn new(describe: F) -> Self {
        Self {
            describe,
            _marker: PhantomData,
        }
    }
}

impl<T, P, F> PickleFactory for TypedFactory<T, P, F>
where
    T: Any,
    P: Pickle,
    F: Fn(&T) -> P + Send + Sync,
{
    fn try_pickle(&self, object: &(dyn Any + Send + Sync)) -> Option<PickleDescriptor> {
        let object = object.downcast_ref::<T>()?;
        Some(PickleDescriptor::new((self.describe)(object)))
    }
}

impl<T, P, F> fmt::Debug for TypedFactory<T, P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedFactory")
            .field("object", &std::any::type_name::<T>())
            .field("pickle", &std::any::type_name::<P>())
            .finish()
    }
}

/// The ordered factory list handed to a writer.
#[derive(Clone, Default)]
pub struct PickleFactories {
    factories: Vec<Arc<dyn PickleFactory>>,
}

impl PickleFactories {
    /// An empty list. Writing any `Live` value with it fails as unclaimed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a factory, builder style.
    pub fn with(mut self, factory: impl PickleFactory + 'static) -> Self {
        self.register(factory);
        self
    }

    /// Appends a factory. Later registrations lose ties against earlier ones.
    pub fn register(&mut self, factory: impl PickleFactory + 'static) {
        self.factories.push(Arc::new(factory));
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Offers `object` to each factory in registration order.
    ///
    /// Returns the position of the winning factory together with its descriptor.
    pub fn try_pickle(
        &self,
        object: &(dyn Any + Send + Sync),
    ) -> Option<(usize, PickleDescriptor)> {
        self.factories
            .iter()
            .enumerate()
            .find_map(|(position, factory)| factory.try_pickle(object).map(|d| (position, d)))
    }
}

impl fmt::Debug for PickleFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickleFactories")
            .field("len", &self.factories.len())
            .finish()
    }
}
