//! Defines the physical binary layout of Hibernate files.
//!
//! File: `[Header] [Main Stream] [Catalog Stream]`
//!
//! ## Header Anatomy (14 bytes, big-endian)
//! ```text
//! offset 0   magic           8 bytes
//! offset 8   version         2 bytes
//! offset 10  catalog offset  4 bytes   (backpatched when the writer closes)
//! ```
//!
//! The main stream starts right after the header and holds the objects handed to
//! `write_object`, one bincode record each, with capsules in place of live objects.
//! The catalog stream holds the ordered descriptor list as a single record.

use serde::{Deserialize, Serialize};

use crate::error::{HibernateError, Result};

/// Magic bytes identifying the file format.
pub const MAGIC: [u8; 8] = 7_330_745_437_582_215_633_i64.to_be_bytes();

/// The one format version this implementation reads and writes.
pub const VERSION: u16 = 1;

/// Magic(8) + Version(2) + CatalogOffset(4) = 14
pub const HEADER_SIZE: usize = 14;

/// Absolute position of the reserved catalog offset field.
pub const CATALOG_OFFSET_POS: u64 = 10;

/// Value held by the catalog offset field until the writer backpatches it.
pub const UNPATCHED_OFFSET: u32 = 0;

/// Codec configuration shared by the main and catalog streams.
pub(crate) fn codec() -> impl bincode::config::Config {
    bincode::config::standard().with_big_endian()
}

/// The fixed-size header at the start of every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version.
    pub version: u16,
    /// Absolute offset of the catalog stream.
    pub catalog_offset: u32,
}

impl Header {
    /// A header whose catalog offset field has not been backpatched yet.
    pub fn unpatched() -> Self {
        Self {
            version: VERSION,
            catalog_offset: UNPATCHED_OFFSET,
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_be_bytes());
        buf[10..14].copy_from_slice(&self.catalog_offset.to_be_bytes());
        buf
    }

    /// Parses and validates a header.
    ///
    /// Only the magic and version are checked here. Whether the catalog offset
    /// points inside the file is up to the caller, who knows the file length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(bytes) = bytes.get(..HEADER_SIZE) else {
            return Err(HibernateError::Format("File smaller than header".into()));
        };

        if bytes[0..8] != MAGIC {
            return Err(HibernateError::Format("Invalid stream header".into()));
        }

        let version = u16::from_be_bytes([bytes[8], bytes[9]]);
        if version != VERSION {
            return Err(HibernateError::Format(format!(
                "Unexpected stream version: {version}"
            )));
        }

        let catalog_offset = u32::from_be_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
        Ok(Self {
            version,
            catalog_offset,
        })
    }
}

/// One serialized descriptor inside the catalog stream.
///
/// `kind` is looked up in the reader's environment; `payload` is the pickle's own
/// encoding and is opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Durable identifier of the pickle type.
    pub kind: String,
    /// Encoded pickle.
    pub payload: Vec<u8>,
}

/// Decodes the raw catalog entries found at `bytes`, which must hold exactly one record.
pub(crate) fn decode_catalog(bytes: &[u8]) -> Result<Vec<CatalogEntry>> {
    let (entries, consumed): (Vec<CatalogEntry>, usize) =
        bincode::serde::decode_from_slice(bytes, codec())
            .map_err(|e| HibernateError::Format(format!("Catalog stream undecodable: {e}")))?;

    if consumed != bytes.len() {
        return Err(HibernateError::Format(format!(
            "{} trailing bytes after catalog stream",
            bytes.len() - consumed
        )));
    }
    Ok(entries)
}
