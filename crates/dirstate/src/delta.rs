//! The delta record shape consumed by `update_by_delta` and
//! `update_basis_by_delta` (§4.7): `(old_path, new_path, file_id,
//! new_entry)`.

use bazaar::FileId;

use crate::inventory::InventoryEntry;

/// One change in a delta. `old_path` is `None` for an addition, `new_path`
/// is `None` for a removal; both present (and differing) is a rename.
/// `new_entry` is `None` for a pure removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEntry {
    pub old_path: Option<Vec<u8>>,
    pub new_path: Option<Vec<u8>>,
    pub file_id: FileId,
    pub new_entry: Option<InventoryEntry>,
}

impl DeltaEntry {
    pub fn add(new_path: impl Into<Vec<u8>>, entry: InventoryEntry) -> Self {
        DeltaEntry {
            old_path: None,
            new_path: Some(new_path.into()),
            file_id: entry.file_id.clone(),
            new_entry: Some(entry),
        }
    }

    pub fn remove(old_path: impl Into<Vec<u8>>, file_id: FileId) -> Self {
        DeltaEntry {
            old_path: Some(old_path.into()),
            new_path: None,
            file_id,
            new_entry: None,
        }
    }

    pub fn rename(old_path: impl Into<Vec<u8>>, new_path: impl Into<Vec<u8>>, entry: InventoryEntry) -> Self {
        DeltaEntry {
            old_path: Some(old_path.into()),
            new_path: Some(new_path.into()),
            file_id: entry.file_id.clone(),
            new_entry: Some(entry),
        }
    }

    pub fn is_rename(&self) -> bool {
        matches!((&self.old_path, &self.new_path), (Some(o), Some(n)) if o != n)
    }
}

/// Reject a delta with more than one record for the same file-id (§4.7:
/// "repeated file-ids within one delta are rejected").
pub fn check_no_duplicate_file_ids(delta: &[DeltaEntry]) -> crate::error::Result<()> {
    let mut seen = std::collections::HashSet::new();
    for entry in delta {
        if !seen.insert(entry.file_id.clone()) {
            return Err(crate::error::Error::DuplicateFileId {
                file_id: entry.file_id.clone(),
                existing_path: entry
                    .new_path
                    .clone()
                    .or_else(|| entry.old_path.clone())
                    .unwrap_or_default(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::MiniKind;

    fn entry(path: &[u8], file_id: &[u8]) -> InventoryEntry {
        InventoryEntry {
            path: path.to_vec(),
            file_id: FileId::from(file_id),
            kind: MiniKind::File,
            executable: false,
            fingerprint: Vec::new(),
        }
    }

    #[test]
    fn duplicate_file_ids_are_rejected() {
        let delta = vec![
            DeltaEntry::add(b"a.txt".to_vec(), entry(b"a.txt", b"same-id")),
            DeltaEntry::add(b"b.txt".to_vec(), entry(b"b.txt", b"same-id")),
        ];
        assert!(check_no_duplicate_file_ids(&delta).is_err());
    }

    #[test]
    fn rename_is_detected_when_paths_differ() {
        let r = DeltaEntry::rename(b"old.txt".to_vec(), b"new.txt".to_vec(), entry(b"new.txt", b"id"));
        assert!(r.is_rename());
        let a = DeltaEntry::add(b"a.txt".to_vec(), entry(b"a.txt", b"id2"));
        assert!(!a.is_rename());
    }
}
