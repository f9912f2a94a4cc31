//! Content hashing primitives.
//!
//! Content hashes are the first eight bytes of a SHA-256 digest. Asset hashes are combined with
//! wrapping addition so the result does not depend on the order in which dependencies are
//! visited.

use sha2::{Digest, Sha256};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use crate::error::CuratorError;

fn truncate(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

pub fn hash_bytes(bytes: &[u8]) -> u64 {
    truncate(&Sha256::digest(bytes))
}

/// Streams the file through the hasher. A file that exists but cannot be opened or read is
/// reported as [`CuratorError::Locked`].
pub fn hash_file(path: &Path) -> Result<u64, CuratorError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CuratorError::NotFound(format!("{path:?}")),
        _ => CuratorError::Locked(format!("{path:?}: {e}")),
    })?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| CuratorError::Locked(format!("{path:?}: {e}")))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(truncate(&hasher.finalize()))
}

/// Order independent accumulation of a content hash into a running asset hash.
pub fn fold(acc: u64, hash: u64) -> u64 {
    acc.wrapping_add(hash)
}
