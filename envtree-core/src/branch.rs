//! Branch resolution for environment elements.

use crate::types::{EnvironmentDeclaration, Partition};

/// Branch used for `common` elements when a declaration names neither an
/// override nor a default.
pub const FALLBACK_BRANCH: &str = "master";

/// Prefix of refs pinning an element to a single commit.
const COMMIT_REF_PREFIX: &str = "commits/";

/// Translates a branch reference into the directory name its checkout
/// lives under in the clone root.
pub trait RefResolver {
    fn dirname(&self, branch_ref: &str) -> String;
}

/// Standard translation: `commits/<sha>` is checked out as `.<sha>`, any
/// other ref keeps its name.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefDirnames;

impl RefResolver for RefDirnames {
    fn dirname(&self, branch_ref: &str) -> String {
        match branch_ref.strip_prefix(COMMIT_REF_PREFIX) {
            Some(sha) => format!(".{sha}"),
            None => branch_ref.to_string(),
        }
    }
}

/// Where a resolved branch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSource {
    Override,
    Default,
    Fallback,
}

/// A resolved branch, already translated into a directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub dirname: String,
    pub source: BranchSource,
}

impl Resolution {
    pub fn overridden(&self) -> bool {
        self.source == BranchSource::Override
    }
}

/// Resolve the branch an element of `partition` is exposed at.
///
/// An override in `overrides[partition][element]` wins, then the
/// declaration's default, then [`FALLBACK_BRANCH`]. Callers exclude
/// opt-in module/hostgroup elements before getting here, so only
/// `common` elements ever reach the fallback.
pub fn resolve(
    declaration: &EnvironmentDeclaration,
    partition: Partition,
    element: &str,
    refs: &dyn RefResolver,
) -> Resolution {
    let (branch, source) = match declaration.override_for(partition, element) {
        Some(branch) => {
            tracing::info!("{partition} '{element}' overridden to use treeish '{branch}'");
            (branch, BranchSource::Override)
        }
        None => match declaration.default.as_deref() {
            Some(branch) => (branch, BranchSource::Default),
            None => (FALLBACK_BRANCH, BranchSource::Fallback),
        },
    };
    Resolution {
        dirname: refs.dirname(branch),
        source,
    }
}
