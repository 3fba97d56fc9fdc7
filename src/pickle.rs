//! The durable side of a stateful object.
//!
//! A [`Pickle`] is a plain serializable value that knows how to rebuild one live
//! resource asynchronously. The engine only ever handles pickles through the
//! type-erased [`PickleDescriptor`], so a catalog can mix any number of kinds.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::environment::Environment;
use crate::error::{HibernateError, Result};
use crate::format::codec;

/// A rehydrated resource, type-erased.
///
/// [`Live<T>`](crate::Live) fields downcast this back to `T` while the main
/// stream is decoded.
pub type LiveObject = Arc<dyn Any + Send + Sync>;

/// Durable description of a stateful resource.
///
/// `KIND` is written into the catalog next to the encoded pickle and must be
/// registered in the reader's [`Environment`] with
/// [`Environment::with_pickle`]. Keep it stable across releases.
///
/// ```rust
/// use std::sync::Arc;
/// use hibernate::{async_trait, Environment, LiveObject, Pickle};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct SessionPickle {
///     endpoint: String,
/// }
///
/// #[async_trait]
/// impl Pickle for SessionPickle {
///     const KIND: &'static str = "demo.session";
///
///     async fn rehydrate(&self, _env: &Environment) -> anyhow::Result<LiveObject> {
///         Ok(Arc::new(format!("connected to {}", self.endpoint)))
///     }
/// }
/// ```
#[async_trait]
pub trait Pickle: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Durable type identifier.
    const KIND: &'static str;

    /// Rebuilds the live resource this pickle describes.
    async fn rehydrate(&self, env: &Environment) -> anyhow::Result<LiveObject>;
}

#[async_trait]
trait ErasedPickle: fmt::Debug + Send + Sync {
    fn kind(&self) -> &'static str;
    fn encode(&self) -> Result<Vec<u8>>;
    fn as_any(&self) -> &dyn Any;
    async fn rehydrate(&self, env: &Environment) -> anyhow::Result<LiveObject>;
}

#[async_trait]
impl<P: Pickle> ErasedPickle for P {
    fn kind(&self) -> &'static str {
        P::KIND
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(self, codec())?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn rehydrate(&self, env: &Environment) -> anyhow::Result<LiveObject> {
        Pickle::rehydrate(self, env).await
    }
}

/// An immutable, type-erased pickle.
///
/// Cloning is cheap; clones share the same pickle. Its identity in a file is its
/// position in the catalog, not anything stored inside it.
#[derive(Clone)]
pub struct PickleDescriptor {
    inner: Arc<dyn ErasedPickle>,
}

impl PickleDescriptor {
    /// Wraps a concrete pickle.
    pub fn new<P: Pickle>(pickle: P) -> Self {
        Self {
            inner: Arc::new(pickle),
        }
    }

    /// Decodes a descriptor of kind `P` from its catalog payload.
    pub(crate) fn decode<P: Pickle>(payload: &[u8]) -> Result<Self> {
        let (pickle, consumed): (P, usize) =
            bincode::serde::decode_from_slice(payload, codec()).map_err(|e| {
                HibernateError::Format(format!("Pickle of kind {} undecodable: {e}", P::KIND))
            })?;
        if consumed != payload.len() {
            return Err(HibernateError::Format(format!(
                "Pickle of kind {} has {} trailing bytes",
                P::KIND,
                payload.len() - consumed
            )));
        }
        Ok(Self::new(pickle))
    }

    /// The durable kind of the wrapped pickle.
    pub fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    /// Encodes the wrapped pickle as it appears in the catalog.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.inner.encode()
    }

    /// Returns the concrete pickle if it is a `P`.
    pub fn downcast_ref<P: Pickle>(&self) -> Option<&P> {
        self.inner.as_any().downcast_ref::<P>()
    }

    /// Runs the wrapped pickle's rehydration.
    pub async fn rehydrate(&self, env: &Environment) -> anyhow::Result<LiveObject> {
        self.inner.rehydrate(env).await
    }
}

impl fmt::Debug for PickleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PickleDescriptor").field(&self.inner).finish()
    }
}
