//! Fixed-width fingerprint of a filesystem `stat` result (§4.1).
//!
//! Encoded as base64 of `(size, mtime, ctime, dev, ino & 0xFFFFFFFF, mode)`,
//! each a big-endian u32, with the trailing `=`/newline padding the
//! encoder would add stripped off. Only ever compared for equality;
//! decoding back to the tuple is not needed by the core.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

/// Sentinel meaning "no stat cached"; never collides with a real encoding
/// because real encodings are base64 of exactly 24 bytes.
pub const NULLSTAT: &str = "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStat(String);

impl PackedStat {
    pub fn null() -> Self {
        PackedStat(NULLSTAT.to_string())
    }

    pub fn is_null(&self) -> bool {
        self.0 == NULLSTAT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        PackedStat(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn encode(size: u64, mtime: u64, ctime: u64, dev: u64, ino: u64, mode: u32) -> Self {
        let fields = [
            (size & 0xFFFF_FFFF) as u32,
            (mtime & 0xFFFF_FFFF) as u32,
            (ctime & 0xFFFF_FFFF) as u32,
            (dev & 0xFFFF_FFFF) as u32,
            (ino & 0xFFFF_FFFF) as u32,
            mode,
        ];
        let mut packed = Vec::with_capacity(24);
        for field in fields {
            packed.extend_from_slice(&field.to_be_bytes());
        }
        PackedStat(STANDARD_NO_PAD.encode(packed))
    }

    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self::encode(
            metadata.size(),
            metadata.mtime() as u64,
            metadata.ctime() as u64,
            metadata.dev(),
            metadata.ino(),
            metadata.mode(),
        )
    }
}

impl std::fmt::Display for PackedStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_not_a_real_encoding() {
        let real = PackedStat::encode(5, 1, 1, 1, 1, 0o100644);
        assert_ne!(real, PackedStat::null());
        assert!(PackedStat::null().is_null());
        assert!(!real.is_null());
    }

    #[test]
    fn encoding_is_stable_and_fixed_width() {
        let a = PackedStat::encode(5, 1000, 1000, 2, 3, 0o100644);
        let b = PackedStat::encode(5, 1000, 1000, 2, 3, 0o100644);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn differing_fields_produce_differing_encodings() {
        let a = PackedStat::encode(5, 1000, 1000, 2, 3, 0o100644);
        let b = PackedStat::encode(6, 1000, 1000, 2, 3, 0o100644);
        assert_ne!(a, b);
    }
}
