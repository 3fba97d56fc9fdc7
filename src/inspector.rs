//! Tools for inspecting the physical structure of Hibernate files.
//! Useful for checking what a snapshot depends on before restoring it.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::environment::Environment;
use crate::error::Result;
use crate::format::{HEADER_SIZE, VERSION};
use crate::reader::HibernateReader;

/// A structural report of a Hibernate file.
#[derive(Debug, Serialize)]
pub struct FileReport {
    /// Total size of the file on disk.
    pub file_size: u64,
    /// Format version.
    pub version: u16,
    /// Offset where the catalog stream starts.
    pub catalog_offset: u32,
    /// Size of the main stream in bytes.
    pub main_stream_len: u64,
    /// The catalog, in index order.
    pub entries: Vec<EntryInfo>,
}

/// Metadata for a single catalog entry.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Catalog index, as referenced by capsules.
    pub index: u32,
    /// Pickle kind the reader's environment must know.
    pub kind: String,
    /// Size of the encoded pickle.
    pub payload_size: usize,
}

/// The Hibernate Inspector tool.
#[derive(Debug)]
pub struct Inspector;

impl Inspector {
    /// Analyzes a file without resolving kinds or rehydrating anything.
    pub fn inspect<P: AsRef<Path>>(path: P) -> Result<FileReport> {
        let reader = HibernateReader::open(path, Arc::new(Environment::new()))?;
        let catalog_offset = reader.parse_header()?;
        let entries = reader
            .raw_catalog(catalog_offset)?
            .into_iter()
            .zip(0u32..)
            .map(|(entry, index)| EntryInfo {
                index,
                payload_size: entry.payload.len(),
                kind: entry.kind,
            })
            .collect();

        Ok(FileReport {
            file_size: reader.file_size(),
            version: VERSION,
            catalog_offset,
            main_stream_len: u64::from(catalog_offset) - HEADER_SIZE as u64,
            entries,
        })
    }
}

impl FileReport {
    /// Pickle kinds referenced by the file that `env` cannot decode.
    pub fn missing_kinds<'a>(&'a self, env: &Environment) -> Vec<&'a str> {
        let mut missing: Vec<&str> = self
            .entries
            .iter()
            .map(|entry| entry.kind.as_str())
            .filter(|kind| !env.knows(kind))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }
}

impl std::fmt::Display for FileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== HIBERNATE INSPECTOR REPORT ===")?;
        writeln!(f, "File Size:      {}b", self.file_size)?;
        writeln!(f, "Version:        {}", self.version)?;
        writeln!(f, "Main Stream:    {}b", self.main_stream_len)?;
        writeln!(f, "Catalog Offset: {}", self.catalog_offset)?;
        writeln!(f, "\n[CATALOG] {} entries", self.entries.len())?;
        for (i, entry) in self.entries.iter().enumerate() {
            let connector = if i + 1 == self.entries.len() { "└── " } else { "├── " };
            writeln!(
                f,
                "{}#{} {} | Size: {}b",
                connector, entry.index, entry.kind, entry.payload_size
            )?;
        }
        Ok(())
    }
}
