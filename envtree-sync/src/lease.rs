//! Lease sizing and the file-backed cooperative lease.
//!
//! ## Sizing
//!
//! Cost per environment, in tenths of a second:
//!
//! | class | cost |
//! |---|---|
//! | new | 3 |
//! | changed | 4 |
//! | notchanged | 2 per upstream new element + 1 per upstream deleted element |
//! | deleted | 1 |
//!
//! The total is rounded up to whole seconds and padded with
//! [`SAFETY_MARGIN_SECS`]. Integer tenths keep the rounding exact.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use fs4::FileExt;

use envtree_core::{ElementDelta, UpstreamDelta};

use crate::delta::Delta;
use crate::error::SyncError;

/// Flat buffer added to every estimate.
pub const SAFETY_MARGIN_SECS: u64 = 2;

const NEW_COST: u64 = 3;
const CHANGED_COST: u64 = 4;
const UPSTREAM_NEW_COST: u64 = 2;
const UPSTREAM_DELETED_COST: u64 = 1;
const DELETED_COST: u64 = 1;

/// Estimate how many seconds a pass over `delta` will take.
///
/// Pure: equal inputs always give equal output, and empty inputs give
/// exactly [`SAFETY_MARGIN_SECS`].
pub fn estimate_seconds(delta: &Delta, modules: &ElementDelta, hostgroups: &ElementDelta) -> u64 {
    let total_new = (modules.new.len() + hostgroups.new.len()) as u64;
    let total_deleted = (modules.deleted.len() + hostgroups.deleted.len()) as u64;
    let per_unchanged = UPSTREAM_NEW_COST * total_new + UPSTREAM_DELETED_COST * total_deleted;
    let tenths = NEW_COST * delta.new.len() as u64
        + CHANGED_COST * delta.changed.len() as u64
        + per_unchanged * delta.notchanged.len() as u64
        + DELETED_COST * delta.deleted.len() as u64;
    tenths.div_ceil(10) + SAFETY_MARGIN_SECS
}

/// [`estimate_seconds`] over both partitions of `upstream`.
pub fn estimate_for_upstream(delta: &Delta, upstream: &UpstreamDelta) -> u64 {
    estimate_seconds(delta, &upstream.modules, &upstream.hostgroups)
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// A time-bounded grant held by the reconciliation process.
pub trait Lease {
    /// Extend the lease so it lasts at least `seconds` from now.
    fn renew(&mut self, seconds: u64) -> Result<(), SyncError>;
}

/// Lease backed by an exclusive advisory lock on a file.
///
/// The file records the lease expiry as an RFC 3339 timestamp. Renewals
/// only ever push the expiry later. The lock is released on drop.
#[derive(Debug)]
pub struct FileLease {
    file: File,
    path: PathBuf,
    expires_at: Option<DateTime<Utc>>,
}

impl FileLease {
    /// Take the lease at `path` without blocking.
    ///
    /// Fails with [`SyncError::Lease`] when another process holds it.
    pub fn acquire(path: &Path) -> Result<Self, SyncError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| lease_err(path, e.to_string()))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| lease_err(path, e.to_string()))?;
        file.try_lock_exclusive().map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                lease_err(path, "held by another process".to_string())
            } else {
                lease_err(path, e.to_string())
            }
        })?;

        // Expiry is tracked from this acquisition onwards.
        tracing::debug!("acquired lease {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            expires_at: None,
        })
    }

    /// Current recorded expiry, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl Lease for FileLease {
    fn renew(&mut self, seconds: u64) -> Result<(), SyncError> {
        let requested = Utc::now() + Duration::seconds(seconds as i64);
        let expiry = match self.expires_at {
            Some(current) if current > requested => current,
            _ => requested,
        };

        let stamp = expiry.to_rfc3339();
        write_stamp(&mut self.file, &stamp).map_err(|e| lease_err(&self.path, e.to_string()))?;
        self.expires_at = Some(expiry);
        tracing::info!("lease renewed for {seconds}s (expires {stamp})");
        Ok(())
    }
}

impl Drop for FileLease {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn write_stamp(file: &mut File, stamp: &str) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(stamp.as_bytes())?;
    file.flush()
}

fn lease_err(path: &Path, reason: String) -> SyncError {
    SyncError::Lease {
        path: path.to_path_buf(),
        reason,
    }
}
