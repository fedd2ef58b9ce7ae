mod archive;
mod manifest;
mod pack;
mod preload;
mod repository;

pub use archive::{pack_directory, Package};
pub use manifest::Metadata;
pub use pack::{LibraryUnit, PackError, TransformUnit};
pub use preload::{resolve_preloads, PreloadOrigin, PreloadScript};
pub use repository::{EffectRepository, UnitStore};

use std::fmt;

pub const EFFECT_MANIFEST: &str = "effect.toml";
pub const EFFECT_SOURCE: &str = "effect.rhai";
pub const LIBRARY_MANIFEST: &str = "lib.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Effect,
    Library,
}

impl UnitKind {
    /// Folder name of this kind below a search root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Effect => "effects",
            Self::Library => "libs",
        }
    }

    pub fn manifest_name(self) -> &'static str {
        match self {
            Self::Effect => EFFECT_MANIFEST,
            Self::Library => LIBRARY_MANIFEST,
        }
    }

    pub fn package_suffix(self) -> &'static str {
        match self {
            Self::Effect => ".fx.xpk",
            Self::Library => ".lib.xpk",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Effect => f.write_str("effect"),
            Self::Library => f.write_str("library"),
        }
    }
}

/// Trims and lowercases a unit id, rejecting anything that could escape a
/// search root.
pub fn normalize_id(input: &str) -> Result<String, PackError> {
    let id = input.trim().to_ascii_lowercase();
    if !is_valid_id(&id) {
        return Err(PackError::InvalidId(input.to_string()));
    }
    Ok(id)
}

pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// Plain file name inside a unit folder: no separators, no parent hops.
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}
