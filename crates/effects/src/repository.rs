//! Resolves effect and library ids to units on disk. The CLI hands it ids
//! from the command line or a chain file; it walks its search roots in order
//! and returns the first folder holding the matching metadata file.
//!
//! Types:
//!
//! - `UnitStore` is the lookup seam the engine and chain interpreter depend
//!   on, so neither knows about search roots.
//! - `EffectRepository` stores the ordered search roots and implements
//!   `UnitStore` against the filesystem.
//!
//! Functions:
//!
//! - `EffectRepository::effect` and `library` load units by id.
//! - `EffectRepository::locate` returns the folder backing an id without
//!   loading it, for packing.
//! - `EffectRepository::install` unpacks a decoded package into a root,
//!   replacing an installed copy only once the new one loads.
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::archive::Package;
use crate::pack::{LibraryUnit, PackError, TransformUnit};
use crate::{normalize_id, UnitKind};

pub trait UnitStore {
    fn effect(&self, id: &str) -> Result<TransformUnit, PackError>;
    fn library(&self, id: &str) -> Result<LibraryUnit, PackError>;
}

#[derive(Debug, Clone)]
pub struct EffectRepository {
    roots: Vec<PathBuf>,
}

impl EffectRepository {
    /// `roots` are searched in order; each holds `effects/` and `libs/`.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn locate(&self, kind: UnitKind, id: &str) -> Result<PathBuf, PackError> {
        let id = normalize_id(id)?;
        debug!(%kind, id = %id, roots = ?self.roots, "resolving unit");

        let mut searched = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let candidate = root.join(kind.dir_name()).join(&id);
            debug!(candidate = %candidate.display(), "checking unit candidate");
            if candidate.join(kind.manifest_name()).is_file() {
                return Ok(candidate);
            }
            searched.push(candidate);
        }

        warn!(%kind, id = %id, roots = ?self.roots, "unit missing");
        Err(PackError::NotFound { kind, id, searched })
    }

    /// Writes `package` below the first root, replacing any previous copy.
    ///
    /// The package is unpacked into a staging folder next to its destination
    /// and loaded from there; the previous copy is only replaced once the new
    /// unit loads cleanly, so a bad package leaves the installed unit intact.
    pub fn install(&self, kind: UnitKind, package: &Package) -> Result<PathBuf, PackError> {
        let root = self.roots.first().ok_or_else(|| PackError::NotFound {
            kind,
            id: package.name().to_string(),
            searched: Vec::new(),
        })?;
        let id = normalize_id(package.name())?;
        if package.file(kind.manifest_name()).is_none() {
            return Err(PackError::CorruptArchive(format!(
                "package '{id}' has no {}; is it a {kind} package?",
                kind.manifest_name()
            )));
        }

        let kind_dir = root.join(kind.dir_name());
        fs::create_dir_all(&kind_dir)?;
        // the staged folder keeps the unit id as its name so metadata
        // validation sees the same folder id as the final install
        let staging = TempDir::new_in(&kind_dir)?;
        let staged = staging.path().join(&id);
        package.unpack_to(&staged)?;
        match kind {
            UnitKind::Effect => TransformUnit::load(&staged).map(|_| ())?,
            UnitKind::Library => LibraryUnit::load(&staged).map(|_| ())?,
        }

        let dest = kind_dir.join(&id);
        let replaced = staging.path().join(".replaced");
        let had_previous = dest.exists();
        if had_previous {
            fs::rename(&dest, &replaced)?;
        }
        if let Err(err) = fs::rename(&staged, &dest) {
            if had_previous {
                fs::rename(&replaced, &dest)?;
            }
            return Err(err.into());
        }
        debug!(%kind, id = %id, replaced = had_previous, "swapped in staged unit");
        // dropping `staging` removes the previous copy

        info!(%kind, id = %id, path = %dest.display(), "installed package");
        Ok(dest)
    }
}

impl UnitStore for EffectRepository {
    fn effect(&self, id: &str) -> Result<TransformUnit, PackError> {
        let dir = self.locate(UnitKind::Effect, id)?;
        let unit = TransformUnit::load(&dir)?;
        debug!(effect = unit.id(), path = %dir.display(), "loaded effect");
        Ok(unit)
    }

    fn library(&self, id: &str) -> Result<LibraryUnit, PackError> {
        let dir = self.locate(UnitKind::Library, id)?;
        LibraryUnit::load(&dir)
    }
}
