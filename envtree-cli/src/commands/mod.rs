pub mod refresh;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use envtree_core::{settings, Settings};

/// Load settings from `explicit`, or from the default location.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path: PathBuf = match explicit {
        Some(path) => path.to_path_buf(),
        None => settings::default_path().context("could not determine settings path")?,
    };
    tracing::debug!("loading settings from {}", path.display());
    settings::load_at(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))
}
