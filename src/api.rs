use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::environment::Environment;
use crate::error::Result;
use crate::factory::PickleFactories;
use crate::reader::{Deserializer, HibernateReader};
use crate::writer::{FileSummary, HibernateWriter};

/// The main entry point for one-shot saves and restores.
#[derive(Debug)]
pub struct Hibernate;

impl Hibernate {
    /// Saves an object graph to a file in a single write session.
    ///
    /// # Arguments
    /// * `path`: Destination file path. Created or truncated.
    /// * `root_object`: The root of the graph. `Live` fields inside it are pickled.
    /// * `factories`: Strategies tried, in order, on every `Live` value.
    pub fn save<T, P>(path: P, root_object: &T, factories: &PickleFactories) -> Result<FileSummary>
    where
        T: Serialize + ?Sized,
        P: AsRef<Path>,
    {
        let mut writer = HibernateWriter::create(path, factories.clone())?;
        writer.write_object(root_object)?;
        writer.close()
    }

    /// Opens a file and rehydrates its pickles.
    ///
    /// Resolves to a deserializer positioned at the first object of the main stream.
    pub async fn begin_restore<P: AsRef<Path>>(
        path: P,
        env: Arc<Environment>,
    ) -> Result<Deserializer> {
        HibernateReader::open(path, env)?.begin_restore().await
    }

    /// Restores a file written by [`save`](Self::save) and reads its root object.
    pub async fn load<T, P>(path: P, env: Arc<Environment>) -> Result<T>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
    {
        Self::begin_restore(path, env).await?.read_object()
    }
}
