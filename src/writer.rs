//! The write side of a session.
//!
//! A [`HibernateWriter`] owns one file for its whole lifetime:
//!
//! 1. `create` writes the header with the catalog offset still at the sentinel.
//! 2. Each `write_object` appends one record to the main stream. `Live` values met
//!    on the way are offered to the factories and replaced by capsules.
//! 3. `close` writes the catalog with pickling switched off, syncs, and backpatches
//!    the catalog offset into the header.
//!
//! Until step 3 completes the header still claims offset 0, so readers reject the
//! file instead of mistaking it for one with an empty catalog.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{HibernateError, Result};
use crate::factory::PickleFactories;
use crate::format::{CATALOG_OFFSET_POS, CatalogEntry, Header, codec};
use crate::io::{SeqWriter, backpatch};
use crate::options::WriterOptions;
use crate::session::{self, PicklingSession};

/// What a completed write session produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSummary {
    /// Absolute offset of the catalog stream, as backpatched into the header.
    pub catalog_offset: u32,
    /// Number of descriptors in the catalog.
    pub catalog_len: usize,
    /// Number of records in the main stream.
    pub objects: u64,
    /// Total file length in bytes.
    pub file_len: u64,
}

/// Writes an object graph, substituting live objects with capsules.
#[derive(Debug)]
pub struct HibernateWriter {
    path: PathBuf,
    out: SeqWriter,
    session: PicklingSession,
    objects: u64,
}

impl HibernateWriter {
    /// Creates the file at `path` with default options.
    pub fn create<P: AsRef<Path>>(path: P, factories: PickleFactories) -> Result<Self> {
        Self::create_with(path, factories, WriterOptions::default())
    }

    /// Creates (or truncates) the file at `path` and writes the unpatched header.
    pub fn create_with<P: AsRef<Path>>(
        path: P,
        factories: PickleFactories,
        options: WriterOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut out = SeqWriter::create(&path, options.buffer_size)?;
        out.write_all(&Header::unpatched().to_bytes())?;

        tracing::debug!(
            path = %path.display(),
            factories = factories.len(),
            "write session opened"
        );
        Ok(Self {
            path,
            out,
            session: PicklingSession::new(factories),
            objects: 0,
        })
    }

    /// Appends `value` to the main stream.
    ///
    /// If encoding fails, nothing is written and every descriptor the failed value
    /// contributed is removed from the catalog again, so the writer stays usable.
    pub fn write_object<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let mark = self.session.mark();
        let encoded = session::pickling(&mut self.session, || {
            bincode::serde::encode_to_vec(value, codec())
        })?;

        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = self.session.take_error().unwrap_or_else(|| e.into());
                self.session.rollback(mark);
                return Err(err);
            }
        };

        let offset = self.out.write_all(&bytes)?;
        self.objects += 1;
        tracing::trace!(
            offset,
            len = bytes.len(),
            catalog_len = self.session.catalog_len(),
            "object written"
        );
        Ok(())
    }

    /// Number of descriptors accumulated so far.
    pub fn catalog_len(&self) -> usize {
        self.session.catalog_len()
    }

    /// Writes the catalog, closes the file and backpatches the header.
    pub fn close(self) -> Result<FileSummary> {
        let Self {
            path,
            mut out,
            session,
            objects,
        } = self;

        let main_end = out.current_offset();
        let catalog_offset = u32::try_from(main_end).map_err(|_| {
            HibernateError::Format(format!(
                "main stream ends at byte {main_end}, beyond the 4-byte catalog offset"
            ))
        })?;

        // No session is installed from here on, so pickles cannot pickle again.
        let catalog = session.into_catalog();
        let entries = catalog
            .iter()
            .map(|descriptor| {
                Ok(CatalogEntry {
                    kind: descriptor.kind().to_string(),
                    payload: descriptor.encode()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let bytes = bincode::serde::encode_to_vec(&entries, codec())?;
        out.write_all(&bytes)?;
        let file_len = out.finish()?;

        backpatch(&path, CATALOG_OFFSET_POS, &catalog_offset.to_be_bytes())?;

        tracing::info!(
            path = %path.display(),
            catalog_offset,
            catalog_len = entries.len(),
            objects,
            file_len,
            "write session closed"
        );
        Ok(FileSummary {
            catalog_offset,
            catalog_len: entries.len(),
            objects,
            file_len,
        })
    }
}
