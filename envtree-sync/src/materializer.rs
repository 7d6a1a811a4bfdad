//! Applies tree plans to disk.
//!
//! Operations are idempotent from a clean start but not transactional: a
//! failure part-way leaves a partially linked environment, which the next
//! pass repairs because the digest is only committed after the tree is
//! built.

use std::io::ErrorKind;
use std::path::Path;

use envtree_core::{
    definition, EnvironmentDeclaration, EnvironmentName, Inventory, RefResolver, Settings,
};

use crate::digest::ContentHasher;
use crate::error::{io_err, link_err, tree_err, SyncError};
use crate::hash_store;
use crate::plan::{Element, ElementPlan, Planner, TreeOp};
use crate::report::{EnvironmentAction, EnvironmentReport};

/// Creates, deletes and refreshes environment trees.
pub struct Materializer<'a> {
    settings: &'a Settings,
    planner: Planner<'a>,
    hasher: &'a dyn ContentHasher,
    dry_run: bool,
}

impl<'a> Materializer<'a> {
    pub fn new(
        settings: &'a Settings,
        refs: &'a dyn RefResolver,
        hasher: &'a dyn ContentHasher,
        dry_run: bool,
    ) -> Self {
        Self {
            settings,
            planner: Planner::new(settings, refs),
            hasher,
            dry_run,
        }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn hasher(&self) -> &dyn ContentHasher {
        self.hasher
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    // -----------------------------------------------------------------------
    // Whole environments
    // -----------------------------------------------------------------------

    /// Validate, read and build a new environment, then commit its digest.
    ///
    /// An invalid name or unreadable declaration skips the environment;
    /// failing modules or hostgroups are recorded and the rest carry on.
    pub fn create_environment(
        &self,
        name: &EnvironmentName,
        inventory: &Inventory,
    ) -> EnvironmentReport {
        tracing::info!("creating new environment '{name}'");
        let report = EnvironmentReport::new(name, EnvironmentAction::Created);

        if !name.is_valid() {
            let err = SyncError::InvalidName { name: name.0.clone() };
            return report.skip(Element::Skeleton, &err);
        }
        let declaration = match definition::read_at(self.settings, name) {
            Ok(declaration) => declaration,
            Err(err) => return report.skip(Element::Skeleton, &SyncError::from(err)),
        };
        self.build_environment(report, name, &declaration, inventory)
    }

    fn build_environment(
        &self,
        mut report: EnvironmentReport,
        name: &EnvironmentName,
        declaration: &EnvironmentDeclaration,
        inventory: &Inventory,
    ) -> EnvironmentReport {
        let plan = self.planner.create_environment(name, declaration, inventory);
        for ElementPlan { element, ops } in plan {
            if let Err(err) = self.apply_all(&ops, &mut report) {
                if element == Element::Skeleton {
                    return report.skip(element, &err);
                }
                report.fail(element, &err);
            }
        }

        if !self.dry_run {
            match self.commit(name) {
                Ok(()) => report.committed = true,
                Err(err) => report.fail(Element::Root, &err),
            }
        }
        report
    }

    /// Remove an environment's tree and forget its digest.
    ///
    /// The digest is kept when the tree could not be removed, so the next
    /// pass classifies the environment as deleted again.
    pub fn delete_environment(&self, name: &EnvironmentName) -> EnvironmentReport {
        tracing::info!("deleting environment '{name}'");
        let mut report = EnvironmentReport::new(name, EnvironmentAction::Deleted);
        let root = self.settings.environment_root(name);

        match std::fs::symlink_metadata(&root) {
            Ok(_) => {
                let ops = self.planner.delete_environment(name);
                if let Err(err) = self.apply_all(&ops, &mut report) {
                    return report.skip(Element::Root, &err);
                }
                tracing::info!("deleted '{}'", root.display());
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!("environment '{name}' has no tree at {}", root.display());
            }
            Err(err) => return report.skip(Element::Root, &tree_err(&root, err)),
        }

        if !self.dry_run {
            if let Err(err) = hash_store::clear_at(self.settings, name) {
                report.fail(Element::Root, &err);
            }
        }
        report
    }

    /// Remove a tree left behind by an interrupted pass for an environment
    /// that has no committed digest. Invalid names are left alone for
    /// [`Self::create_environment`] to reject.
    pub fn remove_leftover_root(
        &self,
        name: &EnvironmentName,
        report: &mut EnvironmentReport,
    ) -> Result<(), SyncError> {
        if !name.is_valid() {
            return Ok(());
        }
        let root = self.settings.environment_root(name);
        match std::fs::symlink_metadata(&root) {
            Ok(_) => {
                tracing::warn!(
                    "removing leftover tree of environment '{name}' at {}",
                    root.display()
                );
                let ops = self.planner.delete_environment(name);
                self.apply_all(&ops, report)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(tree_err(&root, err)),
        }
    }

    /// Delete then create. The environment is absent from disk in between.
    pub fn recreate_environment(
        &self,
        name: &EnvironmentName,
        inventory: &Inventory,
    ) -> EnvironmentReport {
        tracing::info!("recreating environment '{name}'");
        let mut report = self.delete_environment(name);
        if report.action == EnvironmentAction::Skipped {
            return report;
        }
        report.action = EnvironmentAction::Recreated;
        report.absorb(self.create_environment(name, inventory));
        report
    }

    // -----------------------------------------------------------------------
    // Individual elements
    // -----------------------------------------------------------------------

    pub fn link_module(
        &self,
        name: &EnvironmentName,
        declaration: &EnvironmentDeclaration,
        module: &str,
        report: &mut EnvironmentReport,
    ) -> Result<(), SyncError> {
        let ops = self.planner.link_module(name, declaration, module);
        self.apply_all(&ops, report)
    }

    /// Remove a module's links; links that do not exist are ignored.
    pub fn unlink_module(
        &self,
        name: &EnvironmentName,
        module: &str,
        report: &mut EnvironmentReport,
    ) -> Result<(), SyncError> {
        tracing::debug!("deleting module '{module}' from environment '{name}'");
        let ops = self.planner.unlink_module(name, module);
        self.apply_all(&ops, report)
    }

    pub fn link_hostgroup(
        &self,
        name: &EnvironmentName,
        declaration: &EnvironmentDeclaration,
        hostgroup: &str,
        report: &mut EnvironmentReport,
    ) -> Result<(), SyncError> {
        let ops = self.planner.link_hostgroup(name, declaration, hostgroup);
        self.apply_all(&ops, report)
    }

    /// Remove a hostgroup's links; links that do not exist are ignored.
    pub fn unlink_hostgroup(
        &self,
        name: &EnvironmentName,
        hostgroup: &str,
        report: &mut EnvironmentReport,
    ) -> Result<(), SyncError> {
        tracing::debug!("deleting hostgroup '{hostgroup}' from environment '{name}'");
        let ops = self.planner.unlink_hostgroup(name, hostgroup);
        self.apply_all(&ops, report)
    }

    // -----------------------------------------------------------------------
    // Apply
    // -----------------------------------------------------------------------

    /// Apply `ops` in order, stopping at the first failure. Every attempted
    /// operation is recorded in `report`.
    fn apply_all(&self, ops: &[TreeOp], report: &mut EnvironmentReport) -> Result<(), SyncError> {
        for op in ops {
            report.operations.push(op.clone());
            if self.dry_run {
                tracing::info!("[dry-run] would {op}");
                continue;
            }
            tracing::debug!("{op}");
            apply(op)?;
        }
        Ok(())
    }

    fn commit(&self, name: &EnvironmentName) -> Result<(), SyncError> {
        let path = self.settings.definition_path(name);
        let digest = self.hasher.digest(&path).map_err(|e| io_err(&path, e))?;
        hash_store::commit_at(self.settings, name, &digest)
    }
}

/// Execute one operation against the filesystem.
pub fn apply(op: &TreeOp) -> Result<(), SyncError> {
    match op {
        TreeOp::CreateDir { path } => std::fs::create_dir(path).map_err(|e| tree_err(path, e)),
        TreeOp::Symlink(spec) => {
            symlink(&spec.target, &spec.link).map_err(|e| link_err(&spec.link, e))
        }
        TreeOp::Unlink { path } => match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                std::fs::remove_file(path).map_err(|e| link_err(path, e))
            }
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(link_err(path, err)),
        },
        TreeOp::WriteFile { path, contents } => {
            std::fs::write(path, contents).map_err(|e| tree_err(path, e))
        }
        TreeOp::RemoveTree { path } => std::fs::remove_dir_all(path).map_err(|e| tree_err(path, e)),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        "environment trees require symlink support",
    ))
}
