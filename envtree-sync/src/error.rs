//! Error types for envtree-sync.

use std::path::PathBuf;

use thiserror::Error;

use envtree_core::DefinitionError;

/// All errors that can arise from reconciliation operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The environment's declaration is missing, unparseable or invalid.
    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// A directory of the environment tree could not be created or removed.
    #[error("tree error at {path}: {source}")]
    Tree {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A symlink could not be created or removed.
    #[error("link error at {link}: {source}")]
    Link {
        link: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The environment name is not a single word.
    #[error("environment name '{name}' is invalid")]
    InvalidName { name: String },

    /// Any other I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lease could not be acquired or renewed.
    #[error("lease error at {path}: {reason}")]
    Lease { path: PathBuf, reason: String },

    /// Inventory snapshot (de)serialization failure.
    #[error("inventory snapshot error at {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Link`].
pub(crate) fn link_err(link: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Link {
        link: link.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Tree`].
pub(crate) fn tree_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Tree {
        path: path.into(),
        source,
    }
}
