//! Classification of environments into new / changed / notchanged / deleted.

use std::collections::BTreeSet;

use serde::Serialize;

use envtree_core::{definition, EnvironmentName, Settings};

use crate::digest::ContentHasher;
use crate::error::{io_err, SyncError};
use crate::hash_store::{self, PriorState};

/// Every environment name, classified exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Delta {
    /// Declared, no prior state.
    pub new: BTreeSet<EnvironmentName>,
    /// Declared with prior state, digest differs.
    pub changed: BTreeSet<EnvironmentName>,
    /// Declared with prior state, digest equal.
    pub notchanged: BTreeSet<EnvironmentName>,
    /// Prior state only.
    pub deleted: BTreeSet<EnvironmentName>,
}

/// Classify `declared` against `prior`.
///
/// `current_digest` is asked only for names present in both sets; `None`
/// (digest unavailable) classifies the environment as changed.
pub fn compute<F>(
    declared: &BTreeSet<EnvironmentName>,
    prior: &PriorState,
    mut current_digest: F,
) -> Delta
where
    F: FnMut(&EnvironmentName) -> Option<String>,
{
    let mut delta = Delta::default();
    for name in declared {
        let Some(stored) = prior.get(name) else {
            delta.new.insert(name.clone());
            continue;
        };
        match current_digest(name) {
            Some(current) if &current == stored => {
                delta.notchanged.insert(name.clone());
            }
            _ => {
                delta.changed.insert(name.clone());
            }
        }
    }
    delta.deleted = prior
        .keys()
        .filter(|name| !declared.contains(*name))
        .cloned()
        .collect();
    delta
}

/// Compute the delta between the declared environments and the hash store.
pub fn calculate_at(settings: &Settings, hasher: &dyn ContentHasher) -> Result<Delta, SyncError> {
    tracing::debug!("calculating delta...");
    let declared = definition::list_declared_at(settings)
        .map_err(|e| io_err(&settings.env_metadata_dir, e))?;
    let prior = hash_store::prior_state_at(settings)?;
    Ok(compute(&declared, &prior, |name| {
        let path = settings.definition_path(name);
        match hasher.digest(&path) {
            Ok(digest) => Some(digest),
            Err(err) => {
                tracing::warn!("unable to hash {} ({err}), treating as changed", path.display());
                None
            }
        }
    }))
}
