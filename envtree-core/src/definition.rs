//! Environment declarations on disk.
//!
//! # Storage layout
//!
//! ```text
//! <env_metadata_dir>/
//!   <environment>.yaml   (one declaration per environment)
//! ```
//!
//! Reading is side-effect free. Validation is shallow: only
//! the keys this tool acts on are checked, the rest is opaque.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::DefinitionError;
use crate::settings::Settings;
use crate::types::{EnvironmentDeclaration, EnvironmentName};

/// Keys every declaration must carry.
const REQUIRED_KEYS: &[&str] = &["notifications"];

/// Read and validate the declaration of `name`.
///
/// Fails when the file cannot be read, is not YAML, is not a mapping,
/// lacks a required key, or declares `overrides` as an explicit null.
pub fn read_at(
    settings: &Settings,
    name: &EnvironmentName,
) -> Result<EnvironmentDeclaration, DefinitionError> {
    let path = settings.definition_path(name);
    tracing::debug!("reading environment from {}", path.display());
    let contents = std::fs::read_to_string(&path).map_err(|source| {
        DefinitionError::Unreadable {
            path: path.clone(),
            source,
        }
    })?;
    parse(name, &path, &contents)
}

/// Parse declaration `contents` read from `path`.
pub fn parse(
    name: &EnvironmentName,
    path: &Path,
    contents: &str,
) -> Result<EnvironmentDeclaration, DefinitionError> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(contents).map_err(|source| DefinitionError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let Some(mapping) = document.as_mapping() else {
        return Err(DefinitionError::NotAMapping { name: name.0.clone() });
    };

    for key in REQUIRED_KEYS {
        if !mapping.contains_key(*key) {
            return Err(DefinitionError::MissingKey {
                name: name.0.clone(),
                key: *key,
            });
        }
    }
    if mapping.get("overrides").is_some_and(serde_yaml::Value::is_null) {
        return Err(DefinitionError::NullOverrides { name: name.0.clone() });
    }

    let mut declaration: EnvironmentDeclaration =
        serde_yaml::from_value(document).map_err(|source| DefinitionError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    declaration.name = name.clone();
    Ok(declaration)
}

/// Names of every declared environment: the `*.yaml` files in the metadata
/// directory, without their extension. Sorted.
pub fn list_declared_at(settings: &Settings) -> std::io::Result<BTreeSet<EnvironmentName>> {
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(&settings.env_metadata_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            tracing::warn!("skipping non UTF-8 declaration {}", entry.path().display());
            continue;
        };
        if let Some(stem) = file_name.strip_suffix(".yaml") {
            if !stem.is_empty() {
                names.insert(EnvironmentName::from(stem));
            }
        }
    }
    Ok(names)
}
