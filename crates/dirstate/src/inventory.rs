//! The minimal "authoritative enumeration" collaborator interface used by
//! `set_parent_trees` and `set_state_from_inventory` (§4.7): a flat,
//! path-ordered sequence of `(path, file_id, kind, executable,
//! fingerprint)` tuples. Decoupled from `bazaar::inventory::Entry`'s
//! recursive tree shape so this crate doesn't need to know how a
//! particular tree implementation nests its children; [`from_entry_tree`]
//! adapts the one tree shape the `bazaar` crate ships.

use bazaar::FileId;

use crate::key::compare_dirs;
use crate::kind::MiniKind;

/// One entry in a path-ordered inventory enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub path: Vec<u8>,
    pub file_id: FileId,
    pub kind: MiniKind,
    pub executable: bool,
    /// SHA1 for a file, link target for a symlink, empty for a directory.
    pub fingerprint: Vec<u8>,
}

/// A path-ordered enumeration of everything versioned in one tree. Trait
/// rather than a concrete type so callers can supply the working tree, a
/// parent tree, or a synthetic test fixture without this crate depending
/// on how any of them is actually stored.
pub trait Inventory {
    fn entries(&self) -> Vec<InventoryEntry>;
}

/// An enumeration already held in memory, sorted into component order on
/// construction (§4.9's dual cursors rely on both sides being in the same
/// order).
pub struct FlatInventory(Vec<InventoryEntry>);

impl FlatInventory {
    pub fn new(mut entries: Vec<InventoryEntry>) -> Self {
        entries.sort_by(|a, b| compare_dirs(&a.path, &b.path));
        FlatInventory(entries)
    }
}

impl Inventory for FlatInventory {
    fn entries(&self) -> Vec<InventoryEntry> {
        self.0.clone()
    }
}

/// Flatten a `bazaar::inventory::Entry` tree (nested via each directory's
/// `children: Option<HashMap<String, Vec<Entry>>>`) into a path-ordered
/// [`FlatInventory`]. The root entry itself contributes no row, matching
/// the dirstate's convention of an implicit `""` root key (§4.1).
pub fn from_entry_tree(root: &bazaar::inventory::Entry) -> FlatInventory {
    let mut out = Vec::new();
    collect(root, &Vec::new(), true, &mut out);
    FlatInventory::new(out)
}

fn collect(entry: &bazaar::inventory::Entry, parent_path: &[u8], is_root: bool, out: &mut Vec<InventoryEntry>) {
    use bazaar::inventory::Entry;

    let (name, children): (&str, Option<&std::collections::HashMap<String, Vec<Entry>>>) = match entry {
        Entry::Directory { name, children, .. } => (name.as_str(), children.as_ref()),
        Entry::File { name, .. } | Entry::Link { name, .. } | Entry::TreeReference { name, .. } => {
            (name.as_str(), None)
        }
    };

    let path = if is_root {
        Vec::new()
    } else {
        crate::key::join_dir_and_name(parent_path, name.as_bytes())
    };

    if !is_root {
        out.push(InventoryEntry {
            path: path.clone(),
            file_id: file_id_of(entry),
            kind: MiniKind::from(entry.kind()),
            executable: executable_of(entry),
            fingerprint: fingerprint_of(entry),
        });
    }

    if let Some(children) = children {
        for siblings in children.values() {
            for child in siblings {
                collect(child, &path, false, out);
            }
        }
    }
}

fn file_id_of(entry: &bazaar::inventory::Entry) -> FileId {
    use bazaar::inventory::Entry;
    match entry {
        Entry::Directory { file_id, .. }
        | Entry::File { file_id, .. }
        | Entry::Link { file_id, .. }
        | Entry::TreeReference { file_id, .. } => file_id.clone(),
    }
}

fn executable_of(entry: &bazaar::inventory::Entry) -> bool {
    use bazaar::inventory::Entry;
    match entry {
        Entry::File { executable, .. } => *executable,
        _ => false,
    }
}

fn fingerprint_of(entry: &bazaar::inventory::Entry) -> Vec<u8> {
    use bazaar::inventory::Entry;
    match entry {
        Entry::File { text_sha1, .. } => text_sha1.clone().unwrap_or_default(),
        Entry::Link { symlink_target, .. } => symlink_target.clone().unwrap_or_default().into_bytes(),
        Entry::Directory { .. } | Entry::TreeReference { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_inventory_sorts_into_component_order() {
        let inv = FlatInventory::new(vec![
            InventoryEntry {
                path: b"a-b".to_vec(),
                file_id: FileId::from(&b"ab-id"[..]),
                kind: MiniKind::File,
                executable: false,
                fingerprint: Vec::new(),
            },
            InventoryEntry {
                path: b"a/b".to_vec(),
                file_id: FileId::from(&b"a-b-id"[..]),
                kind: MiniKind::File,
                executable: false,
                fingerprint: Vec::new(),
            },
            InventoryEntry {
                path: b"a".to_vec(),
                file_id: FileId::from(&b"a-id"[..]),
                kind: MiniKind::Directory,
                executable: false,
                fingerprint: Vec::new(),
            },
        ]);
        let paths: Vec<Vec<u8>> = inv.entries().into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec![b"a".to_vec(), b"a/b".to_vec(), b"a-b".to_vec()]);
    }
}
