//! Centralized error handling for Hibernate.
//!
//! Every failure in a write or restore session surfaces as a [`HibernateError`]
//! through the returned `Result`. Nothing is retried internally and the library
//! never panics on bad input.
//!
//! ## Error Categories
//!
//! - **I/O Errors** ([`HibernateError::Io`]): create, read, seek or sync failures.
//! - **Format Errors** ([`HibernateError::Format`]): bad magic, unsupported version,
//!   an unpatched or out-of-bounds catalog offset, undecodable stream bytes.
//! - **Dependency Errors** ([`HibernateError::Dependency`]): the file references a
//!   pickle kind or type the current [`Environment`](crate::Environment) cannot provide.
//! - **Rehydration Errors** ([`HibernateError::Rehydration`]): one descriptor failed to
//!   rebuild its live object. The whole restore fails with the first one observed.
//! - **Unclaimed** ([`HibernateError::Unclaimed`]): a [`Live`](crate::Live) value was
//!   written but no factory produced a descriptor for it.
//! - **Serialization** and **Internal** errors cover codec failures and misuse.
//!
//! ## Cloneability
//!
//! [`HibernateError`] is `Clone` so a single failure can be handed to every waiter of
//! a restore. I/O and rehydration causes are held behind an `Arc` for that reason.
//!
//! ```rust
//! use hibernate::HibernateError;
//!
//! fn describe(err: &HibernateError) -> &'static str {
//!     match err {
//!         HibernateError::Io(_) => "storage",
//!         HibernateError::Format(_) => "corrupt or foreign file",
//!         HibernateError::Dependency { .. } => "missing plugin",
//!         HibernateError::Rehydration { .. } => "resource could not be rebuilt",
//!         _ => "other",
//!     }
//! }
//! # assert_eq!(describe(&HibernateError::Format("x".into())), "corrupt or foreign file");
//! ```

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// A specialized `Result` type for Hibernate operations.
pub type Result<T> = std::result::Result<T, HibernateError>;

/// Shared, type-erased cause of a failed rehydration.
pub type RehydrationCause = Arc<dyn StdError + Send + Sync + 'static>;

/// The master error enum covering all failure domains in Hibernate.
#[derive(Debug, Clone, Error)]
pub enum HibernateError {
    /// Low-level I/O failure. Fatal to the current session.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// The file is corrupt, truncated, unpatched or not a Hibernate file.
    #[error("format error: {0}")]
    Format(String),

    /// A type referenced by the file is unavailable in the supplied environment.
    #[error("dependency error: {kind} cannot be resolved in this environment")]
    Dependency {
        /// The kind or type name that could not be resolved.
        kind: String,
    },

    /// A descriptor's asynchronous reconstruction failed.
    #[error("rehydration of pickle #{index} ({kind}) failed: {source}")]
    Rehydration {
        /// Catalog position of the failed descriptor.
        index: u32,
        /// Kind of the failed descriptor.
        kind: String,
        /// The underlying failure reported by the pickle.
        #[source]
        source: RehydrationCause,
    },

    /// A `Live` value reached the writer but no registered factory claimed it.
    #[error("no pickle factory claimed live object of type {type_name}")]
    Unclaimed {
        /// `std::any::type_name` of the unclaimed value.
        type_name: &'static str,
    },

    /// Encoding or decoding failure reported by the stream codec.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Misuse of the engine's state machine. Indicates a bug in the caller or library.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HibernateError {
    /// Wraps a pickle's failure with its catalog position.
    pub(crate) fn rehydration(index: u32, kind: &str, cause: anyhow::Error) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = cause.into();
        Self::Rehydration {
            index,
            kind: kind.to_string(),
            source: Arc::from(boxed),
        }
    }

    /// Returns true for errors caused by a corrupt or foreign file.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }
}

impl From<io::Error> for HibernateError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<bincode::error::EncodeError> for HibernateError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for HibernateError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Format(err.to_string())
    }
}
