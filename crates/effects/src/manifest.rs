//! Metadata schema shared by effect folders (`effect.toml`) and library
//! folders (`lib.toml`). `pack` parses it and rejects folders whose
//! metadata reports issues; `repository` and the CLI `about` command read it
//! back unchanged.
//!
//! Types:
//!
//! - `Metadata` holds the descriptive fields plus the ordered preload list and
//!   the declared library dependencies consulted during preload resolution.
//!
//! Functions:
//!
//! - `Metadata::validate` returns human-readable issues instead of failing on
//!   the first one, so a broken folder is reported in a single pass.
use serde::{Deserialize, Serialize};

use crate::{is_plain_file_name, is_valid_id, UnitKind};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, alias = "desc")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preload: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libs: Vec<String>,
}

impl Metadata {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Checks the parsed fields against the folder they were loaded from.
    /// An empty `id` is filled in by the caller from `dir_id`.
    pub fn validate(&self, kind: UnitKind, dir_id: &str) -> Vec<String> {
        let mut issues = Vec::new();
        if self.name.trim().is_empty() {
            issues.push("name must not be empty".to_string());
        }
        if self.version.trim().is_empty() {
            issues.push("version must not be empty".to_string());
        }
        if !self.id.is_empty() && self.id != dir_id {
            issues.push(format!(
                "declared id '{}' does not match folder '{}'",
                self.id, dir_id
            ));
        }

        match kind {
            UnitKind::Effect => {
                for (index, file) in self.preload.iter().enumerate() {
                    if !is_plain_file_name(file) {
                        issues.push(format!(
                            "preload '{file}' must be a plain file name inside the effect folder"
                        ));
                    }
                    if self.preload[..index].contains(file) {
                        issues.push(format!("preload '{file}' is listed more than once"));
                    }
                }
                for lib in &self.libs {
                    if !is_valid_id(lib) {
                        issues.push(format!("library id '{lib}' is not a valid identifier"));
                    }
                }
            }
            UnitKind::Library => {
                if !self.preload.is_empty() {
                    issues.push("libraries cannot declare preload files".to_string());
                }
                if !self.libs.is_empty() {
                    issues.push("libraries cannot declare library dependencies".to_string());
                }
            }
        }
        issues
    }
}
