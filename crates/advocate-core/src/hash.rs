//! Content hashing for cache keys.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Number of leading bytes hashed to form a document's cache key.
pub const HASH_PREFIX_BYTES: u64 = 1024 * 1024;

/// Compute the cache key for a document from its leading bytes.
///
/// Reads at most [`HASH_PREFIX_BYTES`] from the start of the file and
/// returns the lowercase hex BLAKE3 digest of that prefix. Hashing only a
/// bounded prefix keeps keying cheap for large uploads, with the accepted
/// trade-off that two documents identical in their first MiB (e.g. a shared
/// cover-page stack with different bodies) map to the same key and hit each
/// other's cached results. The digest is a cache key, not an integrity
/// check.
pub fn content_hash(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut prefix = Vec::new();
    file.take(HASH_PREFIX_BYTES).read_to_end(&mut prefix)?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(&prefix);
    Ok(hasher.finalize().to_hex().to_string())
}
