//! Portable package format for distributing units as one file. A package is
//! a zip archive holding the unit folder's files flat at the top level, with
//! the unit name stored as the archive comment.
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use tracing::debug;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::is_plain_file_name;
use crate::pack::PackError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    name: String,
    files: BTreeMap<String, Vec<u8>>,
}

impl Package {
    pub fn new(name: impl Into<String>, files: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn encode(&self) -> Result<Vec<u8>, PackError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in &self.files {
            writer.start_file(name.as_str(), options).map_err(zip_error)?;
            writer.write_all(bytes)?;
        }
        writer.set_comment(self.name.as_str());
        let cursor = writer.finish().map_err(zip_error)?;
        Ok(cursor.into_inner())
    }

    /// Decodes a whole package or nothing: any truncation, checksum mismatch
    /// or unsafe entry name fails with `CorruptArchive`.
    pub fn decode(bytes: &[u8]) -> Result<Self, PackError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;
        let name = std::str::from_utf8(archive.comment())
            .map_err(|_| PackError::CorruptArchive("package name is not UTF-8".into()))?
            .trim()
            .to_string();
        if name.is_empty() {
            return Err(PackError::CorruptArchive("package has no name".into()));
        }

        let mut files = BTreeMap::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(corrupt)?;
            let entry_name = entry.name().to_string();
            if entry.is_dir() || !is_plain_file_name(&entry_name) {
                return Err(PackError::CorruptArchive(format!(
                    "unexpected entry '{entry_name}'"
                )));
            }
            let mut buffer = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut buffer)
                .map_err(|err| PackError::CorruptArchive(format!("{entry_name}: {err}")))?;
            if files.insert(entry_name.clone(), buffer).is_some() {
                return Err(PackError::CorruptArchive(format!(
                    "duplicate entry '{entry_name}'"
                )));
            }
        }

        debug!(package = %name, files = files.len(), "decoded package");
        Ok(Self { name, files })
    }

    pub fn unpack_to(&self, dest: &Path) -> Result<(), PackError> {
        fs::create_dir_all(dest)?;
        for (name, bytes) in &self.files {
            fs::write(dest.join(name), bytes)?;
        }
        Ok(())
    }
}

/// Packs every regular file directly inside `dir` under `name`.
pub fn pack_directory(dir: &Path, name: &str) -> Result<Vec<u8>, PackError> {
    let mut files = BTreeMap::new();
    let entries = fs::read_dir(dir).map_err(|source| PackError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            debug!(path = %entry.path().display(), "skipping non-file entry while packing");
            continue;
        }
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let path = entry.path();
        let bytes = fs::read(&path).map_err(|source| PackError::Read { path, source })?;
        files.insert(file_name, bytes);
    }
    Package::new(name, files).encode()
}

fn corrupt(err: ZipError) -> PackError {
    PackError::CorruptArchive(err.to_string())
}

fn zip_error(err: ZipError) -> PackError {
    match err {
        ZipError::Io(io) => PackError::Io(io),
        other => PackError::CorruptArchive(other.to_string()),
    }
}
