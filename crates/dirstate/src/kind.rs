//! The per-tree-column kind tag and the 5-tuple of details it heads.

/// Single-byte kind tag. `File`/`Directory`/`Symlink`/`TreeReference` are
/// *present* kinds; `Absent`/`Relocated` are pointer/placeholder kinds only
/// meaningful in a tree column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiniKind {
    File,
    Directory,
    Symlink,
    TreeReference,
    Absent,
    Relocated,
}

impl MiniKind {
    pub fn to_char(self) -> char {
        match self {
            MiniKind::File => 'f',
            MiniKind::Directory => 'd',
            MiniKind::Symlink => 'l',
            MiniKind::TreeReference => 't',
            MiniKind::Absent => 'a',
            MiniKind::Relocated => 'r',
        }
    }

    pub fn from_char(c: u8) -> crate::error::Result<MiniKind> {
        Ok(match c {
            b'f' => MiniKind::File,
            b'd' => MiniKind::Directory,
            b'l' => MiniKind::Symlink,
            b't' => MiniKind::TreeReference,
            b'a' => MiniKind::Absent,
            b'r' => MiniKind::Relocated,
            other => {
                return Err(crate::error::Error::Format(format!(
                    "unknown minikind byte: {:?}",
                    other as char
                )))
            }
        })
    }

    /// True for `f`/`d`/`l`/`t`: the entry is actually there in this tree.
    pub fn is_present(self) -> bool {
        !matches!(self, MiniKind::Absent | MiniKind::Relocated)
    }
}

impl From<breezy_osutils::Kind> for MiniKind {
    fn from(k: breezy_osutils::Kind) -> Self {
        match k {
            breezy_osutils::Kind::File => MiniKind::File,
            breezy_osutils::Kind::Directory => MiniKind::Directory,
            breezy_osutils::Kind::Symlink => MiniKind::Symlink,
            breezy_osutils::Kind::TreeReference => MiniKind::TreeReference,
        }
    }
}

/// The per-tree-column payload: `(minikind, fingerprint, size, executable,
/// packed_stat_or_revision)`.
///
/// `fingerprint` holds the SHA1 for a file, the link target for a symlink,
/// the referenced revision for a tree-reference, or the real path for a
/// relocation; it is empty for directories and absent entries.
///
/// The last field is a packed stat in tree column 0, and a revision id in
/// parent columns (columns are otherwise shaped identically, which is why
/// this is one struct rather than two).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDetails {
    pub minikind: MiniKind,
    pub fingerprint: Vec<u8>,
    pub size: u64,
    pub executable: bool,
    pub packed_stat_or_revision: Vec<u8>,
}

impl TreeDetails {
    pub fn new(
        minikind: MiniKind,
        fingerprint: impl Into<Vec<u8>>,
        size: u64,
        executable: bool,
        packed_stat_or_revision: impl Into<Vec<u8>>,
    ) -> Self {
        TreeDetails {
            minikind,
            fingerprint: fingerprint.into(),
            size,
            executable,
            packed_stat_or_revision: packed_stat_or_revision.into(),
        }
    }

    /// The `(a, "", 0, false, "")` tuple used to fill in a tree column that
    /// has no information (new parent with no occurrence of this id, or a
    /// row being marked absent).
    pub fn absent() -> Self {
        TreeDetails::new(MiniKind::Absent, Vec::new(), 0, false, Vec::new())
    }

    /// A pointer record: "the real entry for this file-id in this tree
    /// lives at `real_path`".
    pub fn relocated(real_path: impl Into<Vec<u8>>) -> Self {
        TreeDetails::new(MiniKind::Relocated, real_path, 0, false, Vec::new())
    }

    pub fn is_present(&self) -> bool {
        self.minikind.is_present()
    }
}
