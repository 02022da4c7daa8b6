//! Enrollment store: the ordered list of enrolled identities and its file.
//!
//! The file holds two parallel arrays, `names` and `encodings`, in enrollment
//! order. Every append rewrites the whole file.

use crate::types::{Embedding, Identity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt enrollment file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize enrollments: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    names: Vec<String>,
    encodings: Vec<Vec<f32>>,
}

/// In-memory enrolled identities backed by a single JSON file.
#[derive(Debug)]
pub struct EnrollmentStore {
    path: PathBuf,
    identities: Vec<Identity>,
}

impl EnrollmentStore {
    /// Empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            identities: Vec::new(),
        }
    }

    /// Load the store at `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no enrollment file; starting empty");
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let file: StoreFile = serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if file.names.len() != file.encodings.len() {
            return Err(StoreError::Corrupt {
                reason: format!(
                    "{} names but {} encodings",
                    file.names.len(),
                    file.encodings.len()
                ),
                path,
            });
        }

        let identities: Vec<Identity> = file
            .names
            .into_iter()
            .zip(file.encodings)
            .map(|(name, values)| Identity::new(name, Embedding::new(values)))
            .collect();

        tracing::info!(path = %path.display(), count = identities.len(), "loaded enrollments");
        Ok(Self { path, identities })
    }

    /// Load the store, falling back to an empty one if the file is unreadable.
    ///
    /// The error is handed back so the caller can show it; startup continues
    /// either way.
    pub fn load_or_empty(path: impl Into<PathBuf>) -> (Self, Option<StoreError>) {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(store) => (store, None),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load enrollments; starting empty");
                (Self::empty(path), Some(e))
            }
        }
    }

    /// Append an identity and rewrite the file.
    ///
    /// The identity stays in memory even if the write fails.
    pub fn append_and_persist(&mut self, name: impl Into<String>, embedding: Embedding) -> Result<(), StoreError> {
        let identity = Identity::new(name, embedding);
        tracing::info!(name = %identity.name, index = self.identities.len(), "enrolled identity");
        self.identities.push(identity);
        self.save()
    }

    /// Serialize every identity to the store path.
    pub fn save(&self) -> Result<(), StoreError> {
        let file = StoreFile {
            names: self.identities.iter().map(|i| i.name.clone()).collect(),
            encodings: self.identities.iter().map(|i| i.embedding.values.clone()).collect(),
        };
        let json = serde_json::to_vec(&file)?;

        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Immutable copy handed to a capture run.
    pub fn snapshot(&self) -> Arc<[Identity]> {
        self.identities.iter().cloned().collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
