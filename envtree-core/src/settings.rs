//! Immutable runtime settings.
//!
//! # File format
//!
//! ```yaml
//! clone_dir: /var/lib/envtree/clone
//! environments_dir: /var/lib/envtree/environments
//! env_metadata_dir: /var/lib/envtree/metadata/environments
//! cache_dir: /var/cache/envtree
//! directory_environments: true
//! ```
//!
//! Relative directories are resolved against the directory holding the
//! settings file, so a checkout can carry its own configuration.
//!
//! # Cache layout
//!
//! ```text
//! <cache_dir>/
//!   environments/<name>   (declaration digest at last materialization)
//!   inventory.yaml        (inventory snapshot from the last refresh)
//!   .lock                 (lease file)
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::EnvironmentName;

/// Environment variable overriding the default settings path.
pub const CONFIG_ENV_VAR: &str = "ENVTREE_CONFIG";

/// Name of the per-environment manifest written in directory-environment mode.
pub const DIRECTORY_ENVIRONMENTS_CONF_FILENAME: &str = "environment.conf";

/// Settings shared by every component of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Root of the per-branch checkouts: `<clone_dir>/{modules,hostgroups,common}/<name>/<branch>`.
    pub clone_dir: PathBuf,
    /// Root of the materialized environments.
    pub environments_dir: PathBuf,
    /// Directory holding one `<name>.yaml` declaration per environment.
    pub env_metadata_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Emit `environment.conf` into every created environment.
    #[serde(default)]
    pub directory_environments: bool,
    #[serde(default = "default_mandatory_branches")]
    pub mandatory_branches: Vec<String>,
}

fn default_mandatory_branches() -> Vec<String> {
    vec!["master".to_string(), "qa".to_string()]
}

impl Settings {
    /// Settings rooted at a single base directory, using the conventional
    /// sub-directory names. Mostly useful for tests and first-time setups.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            clone_dir: base.join("clone"),
            environments_dir: base.join("environments"),
            env_metadata_dir: base.join("metadata").join("environments"),
            cache_dir: base.join("cache"),
            directory_environments: false,
            mandatory_branches: default_mandatory_branches(),
        }
    }

    /// `<environments_dir>/<name>`
    pub fn environment_root(&self, name: &EnvironmentName) -> PathBuf {
        self.environments_dir.join(&name.0)
    }

    /// `<env_metadata_dir>/<name>.yaml`
    pub fn definition_path(&self, name: &EnvironmentName) -> PathBuf {
        self.env_metadata_dir.join(format!("{}.yaml", name.0))
    }

    /// `<cache_dir>/environments`
    pub fn digest_dir(&self) -> PathBuf {
        self.cache_dir.join("environments")
    }

    /// `<cache_dir>/inventory.yaml`
    pub fn inventory_snapshot_path(&self) -> PathBuf {
        self.cache_dir.join("inventory.yaml")
    }

    /// `<cache_dir>/.lock`
    pub fn lease_path(&self) -> PathBuf {
        self.cache_dir.join(".lock")
    }

    fn resolve_relative_to(mut self, base: &Path) -> Self {
        for dir in [
            &mut self.clone_dir,
            &mut self.environments_dir,
            &mut self.env_metadata_dir,
            &mut self.cache_dir,
        ] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        self
    }
}

/// Load settings from the YAML file at `path`.
pub fn load_at(path: &Path) -> Result<Settings, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: Settings =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(settings.resolve_relative_to(base))
}

/// Default settings path: `$ENVTREE_CONFIG`, else `<config_dir>/envtree/config.yaml`.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("envtree").join("config.yaml"))
        .ok_or(ConfigError::ConfigDirNotFound)
}
