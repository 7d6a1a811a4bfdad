//! One reconciliation pass.
//!
//! Order: compute the delta, size and renew the lease, then create new
//! environments, delete removed ones, recreate changed ones and finally
//! refresh unchanged ones against the upstream delta. Deletions run before
//! recreation so freed state is never mistaken for still-declared.

use envtree_core::{
    definition, EnvironmentDeclaration, EnvironmentName, Inventory, RefDirnames, Settings,
    UpstreamDelta,
};

use crate::delta::{self, Delta};
use crate::digest::GitObjectHasher;
use crate::error::SyncError;
use crate::inventory;
use crate::lease::{self, FileLease, Lease};
use crate::materializer::Materializer;
use crate::plan::Element;
use crate::report::{EnvironmentAction, EnvironmentReport, RefreshReport};

/// Run one pass with an already-held lease.
///
/// Only run-level failures (the delta cannot be computed, the lease cannot
/// be renewed) return `Err`; both happen before any tree is touched.
pub fn refresh_environments(
    materializer: &Materializer<'_>,
    lease: &mut dyn Lease,
    upstream: &UpstreamDelta,
    inventory: &Inventory,
) -> Result<RefreshReport, SyncError> {
    let delta = delta::calculate_at(materializer.settings(), materializer.hasher())?;
    log_delta(&delta);

    let lease_seconds = lease::estimate_for_upstream(&delta, upstream);
    tracing::info!("requesting lease for {lease_seconds}s");
    lease.renew(lease_seconds)?;

    let mut environments = Vec::new();
    for name in &delta.new {
        environments.push(create_new_environment(materializer, name, inventory));
    }
    for name in &delta.deleted {
        environments.push(materializer.delete_environment(name));
    }
    for name in &delta.changed {
        environments.push(materializer.recreate_environment(name, inventory));
    }
    for name in &delta.notchanged {
        environments.push(refresh_environment(materializer, name, upstream));
    }

    let report = RefreshReport {
        delta,
        upstream: upstream.clone(),
        lease_seconds,
        dry_run: materializer.is_dry_run(),
        environments,
    };
    let failures = report.failures().count();
    if failures > 0 {
        tracing::warn!("reconciliation finished with {failures} failure(s)");
    } else {
        tracing::info!("reconciliation finished");
    }
    Ok(report)
}

/// Create an environment with no committed digest, first clearing any tree
/// an interrupted pass left at its root.
fn create_new_environment(
    materializer: &Materializer<'_>,
    name: &EnvironmentName,
    inventory: &Inventory,
) -> EnvironmentReport {
    let mut report = EnvironmentReport::new(name, EnvironmentAction::Created);
    if let Err(err) = materializer.remove_leftover_root(name, &mut report) {
        return report.skip(Element::Root, &err);
    }
    report.absorb(materializer.create_environment(name, inventory));
    report
}

/// Apply the upstream delta to an environment whose declaration is unchanged.
///
/// New upstream elements are linked only when the environment has a
/// default branch; deleted ones are unlinked regardless.
pub fn refresh_environment(
    materializer: &Materializer<'_>,
    name: &EnvironmentName,
    upstream: &UpstreamDelta,
) -> EnvironmentReport {
    let report = EnvironmentReport::new(name, EnvironmentAction::Refreshed);
    if upstream.is_empty() {
        return report;
    }
    let declaration = match definition::read_at(materializer.settings(), name) {
        Ok(declaration) => declaration,
        Err(err) => return report.skip(Element::Root, &SyncError::from(err)),
    };
    tracing::info!("refreshing environment '{name}'");
    apply_upstream(materializer, report, name, &declaration, upstream)
}

fn apply_upstream(
    materializer: &Materializer<'_>,
    mut report: EnvironmentReport,
    name: &EnvironmentName,
    declaration: &EnvironmentDeclaration,
    upstream: &UpstreamDelta,
) -> EnvironmentReport {
    if declaration.is_opt_in() {
        tracing::debug!("environment '{name}' has no default, not linking new upstream elements");
    } else {
        for module in &upstream.modules.new {
            if let Err(err) = materializer.link_module(name, declaration, module, &mut report) {
                report.fail(Element::Module(module.clone()), &err);
            }
        }
        for hostgroup in &upstream.hostgroups.new {
            if let Err(err) = materializer.link_hostgroup(name, declaration, hostgroup, &mut report)
            {
                report.fail(Element::Hostgroup(hostgroup.clone()), &err);
            }
        }
    }

    for module in &upstream.modules.deleted {
        if let Err(err) = materializer.unlink_module(name, module, &mut report) {
            report.fail(Element::Module(module.clone()), &err);
        }
    }
    for hostgroup in &upstream.hostgroups.deleted {
        if let Err(err) = materializer.unlink_hostgroup(name, hostgroup, &mut report) {
            report.fail(Element::Hostgroup(hostgroup.clone()), &err);
        }
    }
    report
}

fn log_delta(delta: &Delta) {
    for (label, names) in [
        ("new", &delta.new),
        ("changed", &delta.changed),
        ("notchanged", &delta.notchanged),
        ("deleted", &delta.deleted),
    ] {
        if names.is_empty() {
            continue;
        }
        let joined = names.iter().map(EnvironmentName::as_str).collect::<Vec<_>>().join(", ");
        if label == "notchanged" {
            tracing::debug!("{label} environments: {joined}");
        } else {
            tracing::info!("{label} environments: {joined}");
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Acquire the lease, detect the upstream delta and run one pass with the
/// default collaborators.
///
/// `upstream_override` replaces the snapshot diff. The inventory snapshot
/// is saved only after a real (non dry-run) pass.
pub fn run_at(
    settings: &Settings,
    dry_run: bool,
    upstream_override: Option<UpstreamDelta>,
) -> Result<RefreshReport, SyncError> {
    let mut lease = FileLease::acquire(&settings.lease_path())?;
    let (current, detected) = inventory::detect_upstream_at(settings)?;
    let upstream = upstream_override.unwrap_or(detected);

    let materializer = Materializer::new(settings, &RefDirnames, &GitObjectHasher, dry_run);
    let report = refresh_environments(&materializer, &mut lease, &upstream, &current)?;

    if !dry_run {
        inventory::save_snapshot_at(settings, &current)?;
    }
    Ok(report)
}
