//! Wraps effect and library folders so `repository`, `preload` and the
//! engine see validated units instead of raw files. Filesystem validation is
//! kept here; deciding *which* folder to load is left to `repository`.
//!
//! Types:
//!
//! - `PackError` classifies lookup, metadata, archive and I/O failures.
//! - `TransformUnit` is one effect: metadata, procedure source and the folder
//!   it was loaded from (preload files resolve against that folder).
//! - `LibraryUnit` is a named bundle of helper files, read whole into memory.
//!
//! Functions:
//!
//! - `TransformUnit::load` and `LibraryUnit::load` read a folder, parse and
//!   validate its metadata, and return the unit. Neither has side effects.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::manifest::Metadata;
use crate::{UnitKind, EFFECT_SOURCE};

#[derive(Debug, Error)]
pub enum PackError {
    #[error("{kind} '{id}' not found; searched roots: {searched:?}")]
    NotFound {
        kind: UnitKind,
        id: String,
        searched: Vec<PathBuf>,
    },

    #[error("preload file '{file}' of effect '{effect}' not found in the effect folder or libraries {libs:?}")]
    PreloadNotFound {
        effect: String,
        file: String,
        libs: Vec<String>,
    },

    #[error("invalid unit id '{0}'")]
    InvalidId(String),

    #[error("malformed metadata in {}: {}", path.display(), issues.join("; "))]
    MalformedMetadata { path: PathBuf, issues: Vec<String> },

    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct TransformUnit {
    metadata: Metadata,
    source: String,
    root: PathBuf,
}

impl TransformUnit {
    /// Loads the effect stored in `root`; the folder name is the effect id.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, PackError> {
        let root = root.as_ref().to_path_buf();
        let metadata = load_metadata(&root, UnitKind::Effect)?;
        let source_path = root.join(EFFECT_SOURCE);
        let source = read_text(&source_path)?;
        Ok(Self {
            metadata,
            source,
            root,
        })
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }
}

#[derive(Debug, Clone)]
pub struct LibraryUnit {
    metadata: Metadata,
    files: BTreeMap<String, Vec<u8>>,
    root: PathBuf,
}

impl LibraryUnit {
    pub fn load(root: impl AsRef<Path>) -> Result<Self, PackError> {
        let root = root.as_ref().to_path_buf();
        let metadata = load_metadata(&root, UnitKind::Library)?;

        let mut files = BTreeMap::new();
        let entries = fs::read_dir(&root).map_err(|source| PackError::Read {
            path: root.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "skipping library file with non-UTF-8 name");
                continue;
            };
            if name == UnitKind::Library.manifest_name() {
                continue;
            }
            let path = entry.path();
            let bytes = fs::read(&path).map_err(|source| PackError::Read { path, source })?;
            files.insert(name, bytes);
        }

        tracing::debug!(library = %metadata.id, files = files.len(), "loaded library");
        Ok(Self {
            metadata,
            files,
            root,
        })
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }
}

fn load_metadata(root: &Path, kind: UnitKind) -> Result<Metadata, PackError> {
    let manifest_path = root.join(kind.manifest_name());
    let dir_id = root
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();

    let raw = read_text(&manifest_path)?;
    let mut metadata =
        Metadata::from_toml_str(&raw).map_err(|err| PackError::MalformedMetadata {
            path: manifest_path.clone(),
            issues: vec![err.to_string()],
        })?;

    let issues = metadata.validate(kind, &dir_id);
    if !issues.is_empty() {
        return Err(PackError::MalformedMetadata {
            path: manifest_path,
            issues,
        });
    }
    if metadata.id.is_empty() {
        metadata.id = dir_id;
    }
    Ok(metadata)
}

fn read_text(path: &Path) -> Result<String, PackError> {
    fs::read_to_string(path).map_err(|source| PackError::Read {
        path: path.to_path_buf(),
        source,
    })
}
