//! Hash store: per-environment declaration digests.
//!
//! Persists one plain-text file per environment at
//! `<cache_dir>/environments/<name>` holding the digest of the declaration
//! the environment was last materialized from. A present file means the
//! environment is known to exist on disk.
//!
//! Writes use an atomic `.tmp` + rename.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use envtree_core::{EnvironmentName, Settings};

use crate::error::{io_err, SyncError};

/// Last committed digest per environment.
pub type PriorState = BTreeMap<EnvironmentName, String>;

const TMP_SUFFIX: &str = ".tmp";

/// Path to the digest file for `name`.
pub fn store_path_at(settings: &Settings, name: &EnvironmentName) -> PathBuf {
    settings.digest_dir().join(&name.0)
}

/// Snapshot every committed digest.
///
/// Read fully before a pass mutates anything. A digest file that cannot be
/// read is reported as an empty digest so the environment is regenerated.
pub fn prior_state_at(settings: &Settings) -> Result<PriorState, SyncError> {
    let dir = settings.digest_dir();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(PriorState::new()),
        Err(err) => return Err(io_err(&dir, err)),
    };

    let mut state = PriorState::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(&dir, e))?;
        let Ok(file_name) = entry.file_name().into_string() else {
            tracing::warn!("skipping non UTF-8 cached hash {}", entry.path().display());
            continue;
        };
        if file_name.ends_with(TMP_SUFFIX) {
            continue;
        }
        let digest = match std::fs::read_to_string(entry.path()) {
            Ok(digest) => digest.trim().to_string(),
            Err(err) => {
                tracing::warn!(
                    "unable to read cached hash for environment '{file_name}' ({err}), treating as changed"
                );
                String::new()
            }
        };
        state.insert(EnvironmentName::from(file_name), digest);
    }
    Ok(state)
}

/// Persist `digest` as the committed state of `name`.
pub fn commit_at(
    settings: &Settings,
    name: &EnvironmentName,
    digest: &str,
) -> Result<(), SyncError> {
    let path = store_path_at(settings, name);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid hash store path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let tmp = tmp_path(&path);
    std::fs::write(&tmp, digest).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    tracing::debug!("new cached hash for environment '{name}' is '{digest}'");
    Ok(())
}

/// Forget the committed digest of `name`.
///
/// An already-absent digest is logged and otherwise ignored: stale
/// bookkeeping never blocks a deletion.
pub fn clear_at(settings: &Settings, name: &EnvironmentName) -> Result<(), SyncError> {
    let path = store_path_at(settings, name);
    tracing::debug!("removing cached hash for environment '{name}'");
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!("no cached hash to remove for environment '{name}'");
            Ok(())
        }
        Err(err) => Err(io_err(&path, err)),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}{TMP_SUFFIX}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(tmp: &TempDir) -> Settings {
        Settings::rooted_at(tmp.path())
    }

    #[test]
    fn empty_state_when_dir_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(prior_state_at(&settings(&tmp)).unwrap().is_empty());
    }

    #[test]
    fn commit_then_snapshot() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);
        commit_at(&settings, &EnvironmentName::from("prod"), "deadbeef").unwrap();
        commit_at(&settings, &EnvironmentName::from("qa"), "cafebabe").unwrap();

        let state = prior_state_at(&settings).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state[&EnvironmentName::from("prod")], "deadbeef");
    }

    #[test]
    fn tmp_file_cleaned_up_after_commit() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);
        let name = EnvironmentName::from("prod");
        commit_at(&settings, &name, "deadbeef").unwrap();
        assert!(!tmp_path(&store_path_at(&settings, &name)).exists());
    }

    #[test]
    fn leftover_tmp_files_are_not_environments() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);
        std::fs::create_dir_all(settings.digest_dir()).unwrap();
        std::fs::write(settings.digest_dir().join("prod.tmp"), "x").unwrap();
        assert!(prior_state_at(&settings).unwrap().is_empty());
    }

    #[test]
    fn clear_missing_digest_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        clear_at(&settings(&tmp), &EnvironmentName::from("ghost")).unwrap();
    }

    #[test]
    fn clear_removes_digest() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);
        let name = EnvironmentName::from("prod");
        commit_at(&settings, &name, "deadbeef").unwrap();
        clear_at(&settings, &name).unwrap();
        assert!(prior_state_at(&settings).unwrap().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn unreadable_digest_reads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);
        // A directory in place of the digest file cannot be read as text.
        std::fs::create_dir_all(settings.digest_dir().join("prod")).unwrap();
        let state = prior_state_at(&settings).unwrap();
        assert_eq!(state[&EnvironmentName::from("prod")], "");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn non_utf8_digest_name_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);
        commit_at(&settings, &EnvironmentName::from("prod"), "deadbeef").unwrap();
        let bad = settings.digest_dir().join(OsStr::from_bytes(b"bad\xff"));
        std::fs::write(bad, "cafebabe").unwrap();

        let state = prior_state_at(&settings).unwrap();
        assert_eq!(state.keys().map(EnvironmentName::as_str).collect::<Vec<_>>(), vec!["prod"]);
    }
}
