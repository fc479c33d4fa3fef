use crate::config::FolioConfig;
use crate::error::{Result, StoreError};
use crate::store::SledStore;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

/// On-disk layout of a library:
///
/// ```text
/// <root>/folio.json   optional engine config
/// <root>/index/       sled database (postings + catalog)
/// <root>/uploads/     raw text of every uploaded document
/// ```
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn index(&self) -> PathBuf { self.root.join("index") }
    pub fn uploads(&self) -> PathBuf { self.root.join("uploads") }
    pub fn config(&self) -> PathBuf { self.root.join("folio.json") }

    pub fn ensure(&self) -> Result<()> {
        for dir in [self.root.clone(), self.uploads()] {
            create_dir_all(&dir).map_err(|e| StoreError::Unavailable(format!("creating {}: {e}", dir.display())))?;
        }
        Ok(())
    }
}

/// Storage reference of a document's uploaded text, relative to the uploads dir.
pub fn upload_ref(id: crate::index::DocId) -> String {
    format!("{id}.txt")
}

pub fn open_sled(paths: &DataPaths) -> Result<SledStore> {
    paths.ensure()?;
    Ok(SledStore::open(paths.index())?)
}

/// Explicit path wins; otherwise `<root>/folio.json` if present; otherwise defaults.
pub fn load_config(paths: &DataPaths, explicit: Option<&Path>) -> Result<FolioConfig> {
    match explicit {
        Some(path) => FolioConfig::load(path),
        None if paths.config().is_file() => FolioConfig::load(&paths.config()),
        None => Ok(FolioConfig::default()),
    }
}
