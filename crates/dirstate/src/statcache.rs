//! Stat-cache / observed-sha integration (§4.8, C8): deciding whether a
//! cached fingerprint may still be trusted, and the cutoff-time rule that
//! guards against a fast writer mutating a file within the same clock
//! tick. Embedded per-entry rather than as a separate cache object, unlike
//! the working-tree hashcache this is grounded on
//! (`bazaar::hashcache::HashCache`), since the dirstate already stores one
//! packed stat per entry and needs no second cache structure.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::kind::{MiniKind, TreeDetails};
use crate::packed_stat::PackedStat;

/// Seconds subtracted from the current time to get `cutoff_time` (§4.8).
/// Matches `bazaar::hashcache`'s `DEFAULT_CUTOFF_OFFSET`: a file modified
/// in the last 3 seconds might change again without its mtime advancing,
/// since most filesystem timestamps only have 1-2 second resolution.
pub const CUTOFF_OFFSET_SECS: i64 = -3;

pub fn cutoff_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
        + CUTOFF_OFFSET_SECS
}

/// Whether `metadata`'s mtime or ctime falls at or after `cutoff`: too
/// recent to trust a cached fingerprint against.
fn too_recent(metadata: &Metadata, cutoff: i64) -> bool {
    metadata.mtime() >= cutoff || metadata.ctime() >= cutoff
}

/// The outcome of comparing a dirstate entry's working-tree details
/// against a fresh `stat()` of the file on disk.
#[derive(Debug, PartialEq, Eq)]
pub enum StatResult {
    /// The packed stat is unchanged (and, for files, the size too): the
    /// cached fingerprint is still good.
    Unchanged,
    /// Something differs and the file is safe to re-hash and cache.
    Changed,
    /// Something differs, but the file was modified too recently to trust
    /// a freshly computed fingerprint either — it must be recomputed
    /// every time until it ages out of the cutoff window.
    ChangedTooRecentToCache,
}

/// Compare a working-tree `TreeDetails` against a fresh stat, per §4.8's
/// decision table. `kind` is the kind freshly observed on disk.
pub fn classify(details: &TreeDetails, kind: MiniKind, metadata: &Metadata) -> StatResult {
    if kind == MiniKind::Directory {
        // Directories never cache a fingerprint (§4.8).
        return StatResult::Changed;
    }
    if details.minikind == kind {
        let packed = PackedStat::from_metadata(metadata);
        let same_size = kind != MiniKind::File || details.size == metadata.len();
        if details.packed_stat_or_revision == packed.as_str().as_bytes() && same_size {
            return StatResult::Unchanged;
        }
    }
    if too_recent(metadata, cutoff_time()) {
        StatResult::ChangedTooRecentToCache
    } else {
        StatResult::Changed
    }
}

/// Build the `TreeDetails` to store after recomputing a file's/symlink's
/// fingerprint, honoring the cutoff: a too-recent file gets the sentinel
/// packed stat so nothing downstream mistakes it for a trustworthy cache
/// entry (§4.8).
pub fn refreshed_details(
    kind: MiniKind,
    fingerprint: Vec<u8>,
    size: u64,
    executable: bool,
    metadata: &Metadata,
) -> TreeDetails {
    let packed = if too_recent(metadata, cutoff_time()) {
        PackedStat::null()
    } else {
        PackedStat::from_metadata(metadata)
    };
    TreeDetails::new(kind, fingerprint, size, executable, packed.as_str().as_bytes().to_vec())
}

/// Feed a SHA computed out-of-band (e.g. by a content-filtering reader)
/// back into the cache, honoring the same cutoff rule as a normal refresh
/// (§4.8, `_observed_sha1`).
pub fn observed_sha1(sha1: Vec<u8>, size: u64, metadata: &Metadata) -> TreeDetails {
    refreshed_details(MiniKind::File, sha1, size, false, metadata)
}
