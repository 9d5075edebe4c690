use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::domain::identity::{RepoIdentity, RepoToken};
use crate::domain::stats::RepositoryStat;

/// One persisted analysis, keyed by the repository token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    pub hash: RepoToken,
    pub host: String,
    pub owner: String,
    pub name: String,
    pub stat: RepositoryStat,
}

impl CacheDocument {
    pub fn new(identity: &RepoIdentity, stat: RepositoryStat) -> Self {
        CacheDocument {
            hash: identity.token(),
            host: identity.host.clone(),
            owner: identity.owner.clone(),
            name: identity.name.clone(),
            stat,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error at {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("corrupt document {path}: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

/// Durable cache of finished analyses.
pub trait StatStore: Send + Sync {
    fn get(&self, token: &RepoToken) -> Result<Option<CacheDocument>, StoreError>;
    fn put(&self, doc: &CacheDocument) -> Result<(), StoreError>;
}

/// One `<token>.json` file per repository under a directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonDirStore { dir: dir.into() }
    }

    fn path_of(&self, token: &RepoToken) -> PathBuf {
        self.dir.join(format!("{token}.json"))
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl StatStore for JsonDirStore {
    fn get(&self, token: &RepoToken) -> Result<Option<CacheDocument>, StoreError> {
        let path = self.path_of(token);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path)(e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: path.display().to_string(),
                source,
            })
    }

    fn put(&self, doc: &CacheDocument) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let path = self.path_of(&doc.hash);
        let json = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        // write then rename so readers never see half a document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<RepoToken, CacheDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatStore for MemoryStore {
    fn get(&self, token: &RepoToken) -> Result<Option<CacheDocument>, StoreError> {
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(docs.get(token).cloned())
    }

    fn put(&self, doc: &CacheDocument) -> Result<(), StoreError> {
        self.docs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(doc.hash.clone(), doc.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> CacheDocument {
        let id = RepoIdentity::parse("https://github.com/acme/widgets.git").unwrap();
        CacheDocument::new(
            &id,
            RepositoryStat {
                files_scanned: 4,
                ..Default::default()
            },
        )
    }

    #[test]
    fn document_shape() {
        let v = serde_json::to_value(doc()).unwrap();
        assert_eq!(v["host"], "github.com");
        assert_eq!(v["owner"], "acme");
        assert_eq!(v["name"], "widgets");
        assert_eq!(v["hash"].as_str().unwrap().len(), 32);
        assert_eq!(v["stat"]["files_scanned"], 4);
    }

    #[test]
    fn json_dir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path().join("nested"));
        let d = doc();
        assert!(store.get(&d.hash).unwrap().is_none());
        store.put(&d).unwrap();
        assert_eq!(store.get(&d.hash).unwrap(), Some(d.clone()));
        assert!(dir.path().join("nested").join(format!("{}.json", d.hash)).exists());
    }

    #[test]
    fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        let d = doc();
        fs::write(dir.path().join(format!("{}.json", d.hash)), "{not json").unwrap();
        assert!(matches!(store.get(&d.hash), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::new();
        let mut d = doc();
        store.put(&d).unwrap();
        d.stat.files_scanned = 9;
        store.put(&d).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&d.hash).unwrap().unwrap().stat.files_scanned, 9);
    }
}
