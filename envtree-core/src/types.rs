//! Domain types for declared environments and the upstream inventory.
//!
//! Names are newtypes; element names (modules, hostgroups) stay plain
//! `String`s because they are only ever used as path segments.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ENVIRONMENT_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid environment name pattern"));

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed environment name.
///
/// Any string can be held (names come straight from file listings); call
/// [`EnvironmentName::is_valid`] before using it as a directory name.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentName(pub String);

impl EnvironmentName {
    /// `true` when the name is a single word of ASCII letters, digits or `_`.
    pub fn is_valid(&self) -> bool {
        ENVIRONMENT_NAME_PATTERN.is_match(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EnvironmentName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EnvironmentName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Partitions and overrides
// ---------------------------------------------------------------------------

/// Override namespace a branch reference belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Modules,
    Hostgroups,
    Common,
}

impl Partition {
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Modules => "modules",
            Partition::Hostgroups => "hostgroups",
            Partition::Common => "common",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-partition branch overrides: element name → branch reference.
///
/// A partition written as `modules:` with no value is the same as an
/// absent one. Unknown partition keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostgroups: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<BTreeMap<String, String>>,
}

impl Overrides {
    /// The override table for `partition`, if one was declared.
    pub fn partition(&self, partition: Partition) -> Option<&BTreeMap<String, String>> {
        match partition {
            Partition::Modules => self.modules.as_ref(),
            Partition::Hostgroups => self.hostgroups.as_ref(),
            Partition::Common => self.common.as_ref(),
        }
    }

    /// Branch reference overriding `element` in `partition`.
    pub fn get(&self, partition: Partition, element: &str) -> Option<&str> {
        self.partition(partition)
            .and_then(|table| table.get(element))
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// One environment's declaration, parsed from `<metadata>/<name>.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentDeclaration {
    /// Filled in from the file name by the reader, never from the document.
    #[serde(skip)]
    pub name: EnvironmentName,
    /// Branch used for every element without an override. `None` puts the
    /// environment in opt-in mode: only overridden elements are linked.
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Overrides>,
    /// Required, but never interpreted here.
    pub notifications: serde_yaml::Value,
}

impl EnvironmentDeclaration {
    /// `true` when no default branch is declared.
    pub fn is_opt_in(&self) -> bool {
        self.default.is_none()
    }

    /// Branch reference overriding `element` in `partition`.
    pub fn override_for(&self, partition: Partition, element: &str) -> Option<&str> {
        self.overrides
            .as_ref()
            .and_then(|overrides| overrides.get(partition, element))
    }

    /// Elements of `partition` that this environment links, drawn from
    /// `available`.
    ///
    /// With a default branch that is everything available; in opt-in mode
    /// only the available elements that carry an override.
    pub fn selected_elements<'a>(
        &self,
        partition: Partition,
        available: &'a BTreeSet<String>,
    ) -> Vec<&'a String> {
        if !self.is_opt_in() {
            return available.iter().collect();
        }
        let Some(table) = self
            .overrides
            .as_ref()
            .and_then(|overrides| overrides.partition(partition))
        else {
            return Vec::new();
        };
        available
            .iter()
            .filter(|element| table.contains_key(element.as_str()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Inventory and upstream deltas
// ---------------------------------------------------------------------------

/// Every module and hostgroup currently available in the clone root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub modules: BTreeSet<String>,
    #[serde(default)]
    pub hostgroups: BTreeSet<String>,
}

/// Names that appeared or disappeared upstream for one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDelta {
    #[serde(default)]
    pub new: BTreeSet<String>,
    #[serde(default)]
    pub deleted: BTreeSet<String>,
}

impl ElementDelta {
    fn between(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Self {
        Self {
            new: current.difference(previous).cloned().collect(),
            deleted: previous.difference(current).cloned().collect(),
        }
    }
}

/// Upstream changes since the previous reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamDelta {
    #[serde(default)]
    pub modules: ElementDelta,
    #[serde(default)]
    pub hostgroups: ElementDelta,
}

impl UpstreamDelta {
    /// Derive the delta between two inventory snapshots.
    pub fn between(previous: &Inventory, current: &Inventory) -> Self {
        Self {
            modules: ElementDelta::between(&previous.modules, &current.modules),
            hostgroups: ElementDelta::between(&previous.hostgroups, &current.hostgroups),
        }
    }

    /// Aggregate `(new, deleted)` counts across modules and hostgroups.
    pub fn totals(&self) -> (usize, usize) {
        (
            self.modules.new.len() + self.hostgroups.new.len(),
            self.modules.deleted.len() + self.hostgroups.deleted.len(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.totals() == (0, 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn declaration(default: Option<&str>, modules: &[(&str, &str)]) -> EnvironmentDeclaration {
        let overrides = if modules.is_empty() {
            None
        } else {
            Some(Overrides {
                modules: Some(
                    modules
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Overrides::default()
            })
        };
        EnvironmentDeclaration {
            name: EnvironmentName::from("test"),
            default: default.map(str::to_owned),
            overrides,
            notifications: serde_yaml::Value::String("ops@example.org".into()),
        }
    }

    #[test]
    fn name_validation() {
        assert!(EnvironmentName::from("prod1").is_valid());
        assert!(EnvironmentName::from("qa_2").is_valid());
        assert!(!EnvironmentName::from("prod-1").is_valid());
        assert!(!EnvironmentName::from("").is_valid());
        assert!(!EnvironmentName::from("../etc").is_valid());
        assert!(!EnvironmentName::from("prod1\n").is_valid());
    }

    #[test]
    fn opt_in_selects_only_overridden_elements() {
        let decl = declaration(None, &[("m1", "rel-2"), ("gone", "master")]);
        let available = set(&["m1", "m2"]);
        let selected = decl.selected_elements(Partition::Modules, &available);
        assert_eq!(selected, vec!["m1"]);
        assert!(decl
            .selected_elements(Partition::Hostgroups, &set(&["hg1"]))
            .is_empty());
    }

    #[test]
    fn default_selects_everything() {
        let decl = declaration(Some("master"), &[]);
        let available = set(&["m1", "m2"]);
        assert_eq!(decl.selected_elements(Partition::Modules, &available).len(), 2);
    }

    #[test]
    fn upstream_delta_between_snapshots() {
        let previous = Inventory {
            modules: set(&["a", "b"]),
            hostgroups: set(&["hg"]),
        };
        let current = Inventory {
            modules: set(&["b", "c", "d"]),
            hostgroups: set(&[]),
        };
        let delta = UpstreamDelta::between(&previous, &current);
        assert_eq!(delta.modules.new, set(&["c", "d"]));
        assert_eq!(delta.modules.deleted, set(&["a"]));
        assert_eq!(delta.hostgroups.deleted, set(&["hg"]));
        assert_eq!(delta.totals(), (2, 2));
        assert!(!delta.is_empty());
        assert!(UpstreamDelta::default().is_empty());
    }

    #[test]
    fn partition_display() {
        assert_eq!(Partition::Modules.to_string(), "modules");
        assert_eq!(Partition::Common.to_string(), "common");
    }
}
