//! # Hibernate
//!
//! Persist the object graph of a suspended computation to disk and rebuild it later,
//! possibly in another process, even when parts of that graph are live resources
//! (open connections, remote handles, sessions) that cannot be written as plain data
//! and can only be recreated asynchronously.
//!
//! ## Overview
//!
//! Ordinary values go through serde as usual. A value wrapped in [`Live`] is a
//! *stateful* object: while writing, an ordered list of [`PickleFactory`] strategies
//! turns it into a [`Pickle`], a small durable description of how to recreate it,
//! and a [`Capsule`] holding the pickle's catalog index is written in its place.
//! While reading, every pickle is rehydrated concurrently first; only when all of
//! them have succeeded does decoding of the main stream begin, and each capsule is
//! then swapped for its rehydrated object.
//!
//! ### File Format
//!
//! ```text
//! [Header] [Main Stream] [Catalog Stream]
//! ```
//!
//! The 14-byte header holds a magic constant, the format version and the absolute
//! offset of the catalog stream. The offset is backpatched when the writer closes; a
//! file whose writer never finished still carries offset 0 and is rejected. See
//! [`format`] for the exact layout.
//!
//! ## Core Concepts
//!
//! ### Writer
//!
//! [`HibernateWriter`] owns one file and one catalog for a write session. Each
//! [`HibernateWriter::write_object`] appends a record; [`HibernateWriter::close`]
//! writes the catalog with pickling switched off and backpatches the header.
//!
//! ### Reader and Resolver
//!
//! [`HibernateReader`] memory-maps the file, validates the header, reads the catalog
//! synchronously and resolves every pickle kind against an [`Environment`]. The
//! [`Resolver`] then spawns one task per pickle. The first failure fails the whole
//! restore: a partially rehydrated graph is never handed out.
//!
//! ## Usage Patterns
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hibernate::{Environment, Hibernate, Live, PickleFactories, TypedFactory};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Checkpoint {
//!     step: u32,
//!     conn: Live<Connection>,
//! }
//!
//! // Save: `Connection` is described by a `ConnectionPickle`
//! let factories = PickleFactories::new()
//!     .with(TypedFactory::new(|c: &Connection| ConnectionPickle { url: c.url.clone() }));
//! Hibernate::save("run.hib", &checkpoint, &factories)?;
//!
//! // Restore: the environment must know `ConnectionPickle`
//! let env = Arc::new(Environment::new().with_pickle::<ConnectionPickle>());
//! let restored: Checkpoint = Hibernate::load("run.hib", env).await?;
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` block maps the file in [`reader`].
//! * **No Panics:** no `unwrap()` or `panic!()` in library code (enforced by clippy lints).
//! * **Comprehensive Errors:** every failure is a [`HibernateError`].

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod capsule;
pub mod environment;
pub mod error;
pub mod factory;
pub mod format;
pub mod inspector;
pub mod options;
pub mod pickle;
pub mod reader;
pub mod resolver;
pub mod writer;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod io;

// Private modules
mod session;

// --- RE-EXPORTS ---

pub use api::Hibernate;
pub use capsule::{Capsule, Live};
pub use environment::{Environment, TaskListener, TracingListener};
pub use error::{HibernateError, Result};
pub use factory::{PickleFactories, PickleFactory, TypedFactory};
pub use inspector::{FileReport, Inspector};
pub use options::{FailurePolicy, RestoreOptions, WriterOptions};
pub use pickle::{LiveObject, Pickle, PickleDescriptor};
pub use reader::{Deserializer, HibernateReader};
pub use resolver::{Resolver, ResolverState};
pub use writer::{FileSummary, HibernateWriter};

/// Re-exported so pickles can be implemented without a direct dependency.
pub use async_trait::async_trait;

/// Constants used throughout the library.
pub mod constants {
    /// The default buffer size for I/O operations.
    pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
}
