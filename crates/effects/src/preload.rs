//! Preload resolution: turns the file names an effect lists under `preload`
//! into script text, looking in the effect's own folder first and then in
//! each declared library, in declaration order.
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;

use crate::pack::{LibraryUnit, PackError, TransformUnit};
use crate::repository::UnitStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadOrigin {
    EffectFolder(PathBuf),
    Library(String),
}

#[derive(Debug, Clone)]
pub struct PreloadScript {
    pub file: String,
    pub origin: PreloadOrigin,
    pub source: String,
}

/// Resolves every preload of `unit`, keeping the declared order. Libraries
/// are loaded at most once and only when the effect folder lacks a file.
pub fn resolve_preloads(
    unit: &TransformUnit,
    store: &dyn UnitStore,
) -> Result<Vec<PreloadScript>, PackError> {
    let mut libraries: Vec<LibraryUnit> = Vec::new();
    let mut scripts = Vec::with_capacity(unit.metadata().preload.len());

    for file in &unit.metadata().preload {
        let local = unit.root().join(file);
        if local.is_file() {
            let source = fs::read_to_string(&local).map_err(|source| PackError::Read {
                path: local.clone(),
                source,
            })?;
            debug!(effect = unit.id(), file = %file, path = %local.display(), "resolved preload from effect folder");
            scripts.push(PreloadScript {
                file: file.clone(),
                origin: PreloadOrigin::EffectFolder(local),
                source,
            });
            continue;
        }

        let mut found = None;
        for lib_id in &unit.metadata().libs {
            if !libraries.iter().any(|lib| lib.id() == lib_id) {
                libraries.push(store.library(lib_id)?);
            }
            let Some(lib) = libraries.iter().find(|lib| lib.id() == lib_id) else {
                continue;
            };
            if let Some(bytes) = lib.file(file) {
                let source = String::from_utf8(bytes.to_vec()).map_err(|err| PackError::Read {
                    path: lib.root().join(file),
                    source: io::Error::new(io::ErrorKind::InvalidData, err),
                })?;
                debug!(effect = unit.id(), file = %file, library = %lib_id, "resolved preload from library");
                found = Some(PreloadScript {
                    file: file.clone(),
                    origin: PreloadOrigin::Library(lib_id.clone()),
                    source,
                });
                break;
            }
        }

        match found {
            Some(script) => scripts.push(script),
            None => {
                return Err(PackError::PreloadNotFound {
                    effect: unit.id().to_string(),
                    file: file.clone(),
                    libs: unit.metadata().libs.clone(),
                })
            }
        }
    }

    Ok(scripts)
}
