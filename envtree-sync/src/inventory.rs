//! Inventory scanning and the persisted inventory snapshot.
//!
//! ```text
//! <clone_dir>/
//!   modules/<module>/<branch>/{code,data}
//!   hostgroups/<hostgroup>/<branch>/{code,data}
//!   common/{site,hieradata}/<branch>/...
//! ```

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use envtree_core::{Inventory, Settings, UpstreamDelta};

use crate::error::{io_err, SyncError};

/// Scan the clone root for every available module and hostgroup.
///
/// A missing partition directory is an empty partition.
pub fn scan_at(clone_dir: &Path) -> Result<Inventory, SyncError> {
    Ok(Inventory {
        modules: element_dirs(&clone_dir.join("modules"))?,
        hostgroups: element_dirs(&clone_dir.join("hostgroups"))?,
    })
}

fn element_dirs(dir: &Path) -> Result<BTreeSet<String>, SyncError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(err) => return Err(io_err(dir, err)),
    };
    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!("skipping non UTF-8 element {}", entry.path().display());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            names.insert(name);
        }
    }
    Ok(names)
}

/// Load the inventory recorded by the previous refresh, if there is one.
pub fn load_snapshot_at(settings: &Settings) -> Result<Option<Inventory>, SyncError> {
    let path = settings.inventory_snapshot_path();
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(&path, err)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| SyncError::Snapshot { path, source })
}

/// Record `inventory` for the next refresh. Atomic `.tmp` + rename.
pub fn save_snapshot_at(settings: &Settings, inventory: &Inventory) -> Result<(), SyncError> {
    let path = settings.inventory_snapshot_path();
    std::fs::create_dir_all(&settings.cache_dir).map_err(|e| io_err(&settings.cache_dir, e))?;
    let yaml = serde_yaml::to_string(inventory).map_err(|source| SyncError::Snapshot {
        path: path.clone(),
        source,
    })?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Scan the clone root and diff it against the stored snapshot.
///
/// Returns the current inventory with the upstream delta it implies. The
/// snapshot is not updated; call [`save_snapshot_at`] once the pass is done.
///
/// Without a snapshot the current scan is the baseline and the delta is
/// empty: existing environments already link every scanned element.
pub fn detect_upstream_at(settings: &Settings) -> Result<(Inventory, UpstreamDelta), SyncError> {
    let current = scan_at(&settings.clone_dir)?;
    let delta = match load_snapshot_at(settings)? {
        Some(previous) => UpstreamDelta::between(&previous, &current),
        None => {
            tracing::warn!(
                "no inventory snapshot at {}, taking the current clone as baseline",
                settings.inventory_snapshot_path().display()
            );
            UpstreamDelta::default()
        }
    };
    Ok((current, delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_lists_element_directories() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::rooted_at(tmp.path());
        for dir in ["modules/apache/master", "modules/ntp/qa", "hostgroups/aimon/master"] {
            std::fs::create_dir_all(settings.clone_dir.join(dir)).unwrap();
        }
        std::fs::create_dir_all(settings.clone_dir.join("modules/.git")).unwrap();
        std::fs::write(settings.clone_dir.join("modules/README"), "x").unwrap();

        let inventory = scan_at(&settings.clone_dir).unwrap();
        assert_eq!(
            inventory.modules.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["apache", "ntp"]
        );
        assert_eq!(inventory.hostgroups.len(), 1);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn non_utf8_element_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let modules = tmp.path().join("modules");
        std::fs::create_dir_all(modules.join("apache")).unwrap();
        std::fs::create_dir_all(modules.join(OsStr::from_bytes(b"bad\xff"))).unwrap();

        let inventory = scan_at(tmp.path()).unwrap();
        let modules: Vec<_> = inventory.modules.iter().map(String::as_str).collect();
        assert_eq!(modules, vec!["apache"]);
    }

    #[test]
    fn missing_clone_dir_is_empty_inventory() {
        let tmp = TempDir::new().unwrap();
        let inventory = scan_at(&tmp.path().join("nope")).unwrap();
        assert_eq!(inventory, Inventory::default());
    }

    #[test]
    fn snapshot_drives_upstream_detection() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::rooted_at(tmp.path());
        std::fs::create_dir_all(settings.clone_dir.join("modules/apache/master")).unwrap();

        let (inventory, delta) = detect_upstream_at(&settings).unwrap();
        assert!(delta.is_empty(), "no snapshot means no upstream changes: {delta:?}");
        save_snapshot_at(&settings, &inventory).unwrap();
        assert_eq!(load_snapshot_at(&settings).unwrap(), Some(inventory));

        std::fs::remove_dir_all(settings.clone_dir.join("modules/apache")).unwrap();
        std::fs::create_dir_all(settings.clone_dir.join("modules/ntp/master")).unwrap();
        let (_, delta) = detect_upstream_at(&settings).unwrap();
        assert!(delta.modules.new.contains("ntp"));
        assert!(delta.modules.deleted.contains("apache"));
    }
}
