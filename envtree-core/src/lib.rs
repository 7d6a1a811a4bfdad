//! envtree core library: domain types, settings, declarations, errors.
//!
//! - [`types`]: newtypes, declarations, inventory and upstream deltas
//! - [`settings`]: the immutable [`Settings`] passed to every component
//! - [`definition`]: read and validate environment declarations
//! - [`branch`]: per-element branch resolution
//! - [`error`]: [`DefinitionError`], [`ConfigError`]

pub mod branch;
pub mod definition;
pub mod error;
pub mod settings;
pub mod types;

pub use branch::{resolve, BranchSource, RefDirnames, RefResolver, Resolution};
pub use error::{ConfigError, DefinitionError};
pub use settings::Settings;
pub use types::{
    ElementDelta, EnvironmentDeclaration, EnvironmentName, Inventory, Overrides, Partition,
    UpstreamDelta,
};
