//! Placeholders for stateful objects.
//!
//! [`Live<T>`] marks a field of an object graph as a stateful resource. It is the
//! only place substitution happens: plain values always serialize as themselves,
//! while a `Live` value is swapped for a [`Capsule`] by the active write session
//! and swapped back for its rehydrated object by the active restore session.

use std::any::type_name;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::pickle::LiveObject;
use crate::session;

/// The marker written into the main stream in place of a pickled object.
///
/// It carries nothing but the position of its descriptor in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capsule {
    /// Catalog index of the descriptor this capsule stands for.
    pub index: u32,
}

/// A shared handle to a stateful resource inside a serializable graph.
///
/// Writing a `Live` requires a factory that claims `T`; reading one requires the
/// matching pickle to rehydrate into a `T`. The same `Live` reachable several times
/// is pickled once, and every occurrence reads back as the same `Arc`.
///
/// ```rust
/// use hibernate::Live;
///
/// struct Connection {
///     peer: String,
/// }
///
/// let conn = Live::new(Connection { peer: "db:5432".into() });
/// let alias = conn.clone();
/// assert!(Live::ptr_eq(&conn, &alias));
/// assert_eq!(alias.peer, "db:5432");
/// ```
pub struct Live<T: Send + Sync + 'static>(Arc<T>);

impl<T: Send + Sync + 'static> Live<T> {
    /// Wraps a freshly created resource.
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wraps an already shared resource. Identity is that of the `Arc`.
    pub fn from_arc(value: Arc<T>) -> Self {
        Self(value)
    }

    /// The underlying shared resource.
    pub fn as_arc(&self) -> &Arc<T> {
        &self.0
    }

    /// Unwraps into the underlying shared resource.
    pub fn into_arc(self) -> Arc<T> {
        self.0
    }

    /// Returns true if both handles point at the same resource.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T: Send + Sync + 'static> Clone for Live<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Send + Sync + 'static> Deref for Live<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Send + Sync + 'static> From<Arc<T>> for Live<T> {
    fn from(value: Arc<T>) -> Self {
        Self(value)
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> fmt::Debug for Live<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Live").field(&self.0).finish()
    }
}

impl<T: Send + Sync + 'static> Serialize for Live<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let object: LiveObject = self.0.clone();
        let index = session::substitute(object, type_name::<T>())
            .map_err(<S::Error as serde::ser::Error>::custom)?;
        Capsule { index }.serialize(serializer)
    }
}

impl<'de, T: Send + Sync + 'static> Deserialize<'de> for Live<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let capsule = Capsule::deserialize(deserializer)?;
        session::resolve::<T>(capsule.index)
            .map(Self)
            .map_err(<D::Error as serde::de::Error>::custom)
    }
}
