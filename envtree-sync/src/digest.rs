//! Content digests used as change markers for declarations.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Computes a content digest for a file.
///
/// The digest is only ever compared for equality; it carries no security
/// meaning.
pub trait ContentHasher {
    fn digest(&self, path: &Path) -> io::Result<String>;
}

/// Git object hashing (`blob <len>\0<bytes>`) with SHA-256, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitObjectHasher;

impl GitObjectHasher {
    pub fn digest_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

impl ContentHasher for GitObjectHasher {
    fn digest(&self, path: &Path) -> io::Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(Self::digest_bytes(&bytes))
    }
}
