//! SHA1 computation collaborator (§6's `HashProvider`): callers refreshing
//! a file's fingerprint before feeding it back through
//! [`crate::statcache::observed_sha1`] go through this rather than hashing
//! directly, so the dirstate core stays decoupled from how hashing is
//! actually performed. Grounded on the teacher's
//! `bazaar::dirstate::DefaultSHA1Provider`.

use std::path::Path;

pub trait HashProvider: Send + Sync {
    fn sha1_file(&self, path: &Path) -> std::io::Result<String>;
}

/// Hashes straight off the filesystem with no caching of its own (the
/// dirstate is the cache).
pub struct DefaultHashProvider;

impl HashProvider for DefaultHashProvider {
    fn sha1_file(&self, path: &Path) -> std::io::Result<String> {
        breezy_osutils::sha::sha_file_by_name(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_a_known_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello").unwrap();
        let sha = DefaultHashProvider.sha1_file(&path).unwrap();
        assert_eq!(sha.len(), 40);
    }
}
