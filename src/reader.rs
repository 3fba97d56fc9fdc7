//! The Read-Side Engine.
//!
//! Memory-maps the file, validates the header, reads the catalog synchronously,
//! and hands it to a [`Resolver`]. Only once every pickle is rehydrated does the
//! caller get a [`Deserializer`] over the main stream.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::environment::Environment;
use crate::error::{HibernateError, Result};
use crate::format::{CatalogEntry, HEADER_SIZE, Header, UNPATCHED_OFFSET, codec, decode_catalog};
use crate::options::RestoreOptions;
use crate::pickle::PickleDescriptor;
use crate::resolver::Resolver;
use crate::session;

/// The main handle for reading a Hibernate file.
#[derive(Debug)]
pub struct HibernateReader {
    mmap: Arc<Mmap>,
    env: Arc<Environment>,
    path: PathBuf,
}

impl HibernateReader {
    /// Opens and maps a file. Validation happens in [`parse_header`](Self::parse_header).
    pub fn open<P: AsRef<Path>>(path: P, env: Arc<Environment>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE as u64 {
            return Err(HibernateError::Format("File smaller than header".into()));
        }

        // Safety: the file must not be modified while mapped. Sessions are
        // single-writer and a writer never touches a file it did not create.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self {
            mmap: Arc::new(mmap),
            env,
            path,
        })
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Validates the header and returns the catalog offset.
    pub fn parse_header(&self) -> Result<u32> {
        let header = Header::from_bytes(&self.mmap)?;

        if header.catalog_offset == UNPATCHED_OFFSET {
            return Err(HibernateError::Format(
                "catalog offset was never backpatched; the writer did not finish".into(),
            ));
        }
        let offset = header.catalog_offset as usize;
        if offset < HEADER_SIZE || offset > self.mmap.len() {
            return Err(HibernateError::Format(format!(
                "catalog offset {offset} outside file of {} bytes",
                self.mmap.len()
            )));
        }
        Ok(header.catalog_offset)
    }

    /// Decodes the catalog at `catalog_offset` without resolving kinds.
    pub fn raw_catalog(&self, catalog_offset: u32) -> Result<Vec<CatalogEntry>> {
        let bytes = self
            .mmap
            .get(catalog_offset as usize..)
            .ok_or_else(|| HibernateError::Format("catalog offset out of file bounds".into()))?;
        decode_catalog(bytes)
    }

    /// Reads the catalog at `catalog_offset` and resolves every entry against the
    /// environment.
    pub fn read_catalog(&self, catalog_offset: u32) -> Result<Vec<PickleDescriptor>> {
        self.raw_catalog(catalog_offset)?
            .iter()
            .map(|entry| self.env.decode(entry))
            .collect()
    }

    /// Restores with default options.
    pub async fn begin_restore(self) -> Result<Deserializer> {
        self.begin_restore_with(RestoreOptions::default()).await
    }

    /// Parses the header, reads the catalog, rehydrates every pickle and returns a
    /// deserializer positioned at the start of the main stream.
    ///
    /// Header and catalog problems are reported before any rehydration starts.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn begin_restore_with(self, options: RestoreOptions) -> Result<Deserializer> {
        let catalog_offset = self.parse_header()?;
        let catalog = self.read_catalog(catalog_offset)?;
        tracing::debug!(catalog_offset, catalog_len = catalog.len(), "catalog read");

        let resolver = Resolver::new(catalog, Arc::clone(&self.env))
            .rehydrate_all(options)
            .await?;

        Ok(Deserializer {
            mmap: self.mmap,
            position: HEADER_SIZE,
            end: catalog_offset as usize,
            resolver: Arc::new(resolver),
        })
    }
}

/// Reads objects back from the main stream, with capsules resolved.
#[derive(Debug)]
pub struct Deserializer {
    mmap: Arc<Mmap>,
    position: usize,
    end: usize,
    resolver: Arc<Resolver>,
}

impl Deserializer {
    /// Decodes the next object of the main stream.
    ///
    /// Zero-sized records (unit structs, `()`) decode from no bytes at all, so an
    /// exhausted stream only fails once a type actually needs more input.
    pub fn read_object<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self
            .mmap
            .get(self.position..self.end)
            .ok_or_else(|| HibernateError::Format("read past the end of the main stream".into()))?;

        let (decoded, capsule_error) = session::resolving(&self.resolver, || {
            bincode::serde::decode_from_slice::<T, _>(bytes, codec())
        });
        let (value, consumed) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => return Err(capsule_error.unwrap_or_else(|| e.into())),
        };

        self.position += consumed;
        Ok(value)
    }

    /// Returns true while unread records remain in the main stream.
    pub fn has_remaining(&self) -> bool {
        self.position < self.end
    }

    /// The resolver backing capsule lookups.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}
