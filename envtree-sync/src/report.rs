//! Outcome types returned by batch operations.
//!
//! Per-element failures never abort a batch; they are collected here so
//! callers can assert on exactly which elements failed.

use serde::Serialize;

use envtree_core::{EnvironmentName, UpstreamDelta};

use crate::delta::Delta;
use crate::error::SyncError;
use crate::plan::{Element, TreeOp};

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Definition,
    Link,
    Tree,
    Name,
    /// Digest store or other bookkeeping.
    Store,
}

impl From<&SyncError> for FailureKind {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::Definition(_) => FailureKind::Definition,
            SyncError::Link { .. } => FailureKind::Link,
            SyncError::Tree { .. } => FailureKind::Tree,
            SyncError::InvalidName { .. } => FailureKind::Name,
            SyncError::Io { .. } | SyncError::Lease { .. } | SyncError::Snapshot { .. } => {
                FailureKind::Store
            }
        }
    }
}

/// One failed element of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementFailure {
    pub environment: EnvironmentName,
    pub element: Element,
    pub kind: FailureKind,
    pub message: String,
}

/// What happened to an environment during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentAction {
    Created,
    Deleted,
    Recreated,
    Refreshed,
    /// Nothing was changed because of a whole-environment failure.
    Skipped,
}

/// Outcome of one environment operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    pub name: EnvironmentName,
    pub action: EnvironmentAction,
    /// Operations applied, or in dry-run mode the ones that would be.
    pub operations: Vec<TreeOp>,
    pub failures: Vec<ElementFailure>,
    /// Whether the digest store now reflects this environment.
    pub committed: bool,
}

impl EnvironmentReport {
    pub(crate) fn new(name: &EnvironmentName, action: EnvironmentAction) -> Self {
        Self {
            name: name.clone(),
            action,
            operations: Vec::new(),
            failures: Vec::new(),
            committed: false,
        }
    }

    pub(crate) fn fail(&mut self, element: Element, err: &SyncError) {
        tracing::error!(
            "failed to process {element} in environment '{}' ({err})",
            self.name
        );
        self.failures.push(ElementFailure {
            environment: self.name.clone(),
            element,
            kind: FailureKind::from(err),
            message: err.to_string(),
        });
    }

    pub(crate) fn skip(mut self, element: Element, err: &SyncError) -> Self {
        self.action = EnvironmentAction::Skipped;
        self.fail(element, err);
        self
    }

    /// Fold the report of a follow-up operation on the same environment.
    pub(crate) fn absorb(&mut self, other: EnvironmentReport) {
        self.operations.extend(other.operations);
        self.failures.extend(other.failures);
        self.committed = other.committed;
        if other.action == EnvironmentAction::Skipped {
            self.action = EnvironmentAction::Skipped;
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a full reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub delta: Delta,
    pub upstream: UpstreamDelta,
    /// Seconds requested from the lease before mutating anything.
    pub lease_seconds: u64,
    pub dry_run: bool,
    pub environments: Vec<EnvironmentReport>,
}

impl RefreshReport {
    pub fn failures(&self) -> impl Iterator<Item = &ElementFailure> {
        self.environments.iter().flat_map(|env| env.failures.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Report for `name`, if the pass touched it.
    pub fn environment(&self, name: &str) -> Option<&EnvironmentReport> {
        self.environments.iter().find(|env| env.name.as_str() == name)
    }
}
