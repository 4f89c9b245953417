//! Single-file key/blob store. Every blob is an independently
//! bincode-encoded value, so a reader only decodes what it asks for.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const EXTENSION: &str = "sdb";

pub mod keys {
    pub const IDENTIFICATION: &str = "identification";
    pub const PARAMETERS: &str = "parameters";
    pub const METRICS: &str = "metrics";
    pub const PROJECT_DETAILS: &str = "project_details";
    pub const FEATURES_CACHE: &str = "features_cache";
}

#[derive(Debug)]
pub struct ObjectStore {
    path: PathBuf,
    blobs: BTreeMap<String, Vec<u8>>,
}

impl ObjectStore {
    /// Empty store, written to `path` on [`ObjectStore::flush`]
    pub fn create<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            blobs: BTreeMap::new(),
        }
    }

    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let reader = BufReader::new(File::open(&path)?);
        let blobs = bincode::deserialize_from(reader)?;
        log::trace!("opened object store {}", path.display());
        Ok(Self { path, blobs })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let blob = bincode::serialize(value)?;
        log::trace!("{}: {} bytes", key, blob.len());
        self.blobs.insert(key.to_string(), blob);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_opt(key)?
            .ok_or_else(|| Error::MissingBlob(key.to_string()))
    }

    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.blobs
            .get(key)
            .map(|blob| bincode::deserialize(blob))
            .transpose()
            .map_err(Into::into)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.blobs.remove(key).is_some()
    }

    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&self.path)?);
        bincode::serialize_into(&mut writer, &self.blobs)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blobs_survive_a_flush() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("project.sdb");

        let mut store = ObjectStore::create(&path);
        store.put(keys::METRICS, &vec![Some(1.5f64), None])?;
        store.put(keys::PROJECT_DETAILS, &"VAT1".to_string())?;
        store.flush()?;

        let store = ObjectStore::open(&path)?;
        assert_eq!(store.get::<Vec<Option<f64>>>(keys::METRICS)?, vec![Some(1.5), None]);
        assert_eq!(store.get::<String>(keys::PROJECT_DETAILS)?, "VAT1");
        assert_eq!(store.get_opt::<String>(keys::FEATURES_CACHE)?, None);
        assert!(matches!(
            store.get::<String>(keys::IDENTIFICATION),
            Err(Error::MissingBlob(key)) if key == keys::IDENTIFICATION
        ));
        Ok(())
    }

    #[test]
    fn remove_blob() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = ObjectStore::create(dir.path().join("nested").join("p.sdb"));
        store.put(keys::FEATURES_CACHE, &42u32)?;
        assert_eq!(store.get_opt::<u32>(keys::FEATURES_CACHE)?, Some(42));
        assert!(store.remove(keys::FEATURES_CACHE));
        assert!(!store.remove(keys::FEATURES_CACHE));
        store.flush()?;
        assert!(store.path().exists());
        assert_eq!(
            ObjectStore::open(store.path())?.get_opt::<u32>(keys::FEATURES_CACHE)?,
            None
        );
        Ok(())
    }
}
