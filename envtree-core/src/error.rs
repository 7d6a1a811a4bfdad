//! Error types for envtree-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading an environment declaration.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The declaration file could not be opened or read.
    #[error("unable to open {path} for reading: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML, or its fields have the wrong shape.
    #[error("unable to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document is empty or is not a mapping.
    #[error("environment '{name}' is not a mapping")]
    NotAMapping { name: String },

    /// A required top-level key is absent.
    #[error("missing '{key}' in environment '{name}'")]
    MissingKey { name: String, key: &'static str },

    /// `overrides` is present but explicitly null.
    #[error("lacking overrides in environment '{name}'")]
    NullOverrides { name: String },
}

/// Errors raised while loading [`crate::Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::config_dir()` returned `None` and no explicit path was given.
    #[error("cannot determine the configuration directory; pass --config or set ENVTREE_CONFIG")]
    ConfigDirNotFound,
}
