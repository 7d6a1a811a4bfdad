//! # envtree-sync
//!
//! Change detection and tree materialization for declared environments.
//!
//! Call [`run_at`] for a full pass with the default collaborators, or
//! [`refresh_environments`] to supply your own [`Lease`], hasher or ref
//! resolver through a [`Materializer`].

pub mod delta;
pub mod digest;
pub mod engine;
pub mod error;
pub mod hash_store;
pub mod inventory;
pub mod lease;
pub mod materializer;
pub mod plan;
pub mod report;

pub use delta::Delta;
pub use digest::{ContentHasher, GitObjectHasher};
pub use engine::{refresh_environment, refresh_environments, run_at};
pub use error::SyncError;
pub use lease::{FileLease, Lease};
pub use materializer::Materializer;
pub use plan::{Element, LinkSpec, Planner, TreeOp};
pub use report::{
    ElementFailure, EnvironmentAction, EnvironmentReport, FailureKind, RefreshReport,
};
