//! Keys and the ordering relations that make the dirstate's sort order
//! well defined: component order between blocks, and `(basename, file_id)`
//! order within a block.

use std::cmp::Ordering;

use bazaar::FileId;

/// `(dirname, basename, file_id)`. `dirname` is `""` for the tree root and
/// for entries directly inside the root directory's own block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub dirname: Vec<u8>,
    pub basename: Vec<u8>,
    pub file_id: FileId,
}

impl Key {
    pub fn new(dirname: impl Into<Vec<u8>>, basename: impl Into<Vec<u8>>, file_id: FileId) -> Self {
        Key {
            dirname: dirname.into(),
            basename: basename.into(),
            file_id,
        }
    }

    pub fn root() -> Self {
        Key::new(&b""[..], &b""[..], FileId::from(&b"TREE_ROOT"[..]))
    }

    /// The full path this key names: `dirname + "/" + basename`, or just
    /// `basename` when `dirname` is empty.
    pub fn path(&self) -> Vec<u8> {
        join_dir_and_name(&self.dirname, &self.basename)
    }
}

/// Join a dirname and a basename into a full path the way the on-disk rows
/// and the change iterator expect: `dir/name`, or just `name` for `dir == ""`.
pub fn join_dir_and_name(dirname: &[u8], basename: &[u8]) -> Vec<u8> {
    if dirname.is_empty() {
        basename.to_vec()
    } else {
        let mut out = Vec::with_capacity(dirname.len() + 1 + basename.len());
        out.extend_from_slice(dirname);
        out.push(b'/');
        out.extend_from_slice(basename);
        out
    }
}

/// Split a full path into `(dirname, basename)`, the inverse of
/// [`join_dir_and_name`].
pub fn split_path(path: &[u8]) -> (Vec<u8>, Vec<u8>) {
    match path.iter().rposition(|&b| b == b'/') {
        Some(idx) => (path[..idx].to_vec(), path[idx + 1..].to_vec()),
        None => (Vec::new(), path.to_vec()),
    }
}

/// Component-order comparison: split both paths on `/` and compare
/// component by component. `""` sorts before anything; a directory and
/// all its descendants therefore form one contiguous range, which is not
/// true of plain bytewise comparison (`a-b` < `a/b` bytewise, but `a`'s
/// subtree must sort immediately after `a` itself).
pub fn compare_dirs(a: &[u8], b: &[u8]) -> Ordering {
    // An empty path has zero components, not one empty component, so that
    // "" sorts before "a" rather than comparing equal to it.
    let mut a_rest = a;
    let mut b_rest = b;
    let mut a_done = a.is_empty();
    let mut b_done = b.is_empty();
    loop {
        match (a_done, b_done) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        let (a_part, a_next, a_more) = next_component(a_rest);
        let (b_part, b_next, b_more) = next_component(b_rest);
        match a_part.cmp(b_part) {
            Ordering::Equal => {
                a_rest = a_next;
                b_rest = b_next;
                a_done = !a_more;
                b_done = !b_more;
            }
            other => return other,
        }
    }
}

/// Split off the next `/`-delimited component. Returns `(component, rest,
/// more_remaining)`.
fn next_component(path: &[u8]) -> (&[u8], &[u8], bool) {
    match path.iter().position(|&b| b == b'/') {
        Some(idx) => (&path[..idx], &path[idx + 1..], true),
        None => (path, &[], false),
    }
}

/// Order two full paths the way dirblocks are ordered for bisection within
/// a single directory: by `(dirname, basename)` using plain byte
/// comparison of the split components. Used only when every candidate is
/// known to share context (e.g. bisecting within one block); the outer,
/// cross-directory order is [`compare_dirs`].
pub fn compare_path_by_dirblock(a: &[u8], b: &[u8]) -> Ordering {
    let (a_dir, a_name) = split_path(a);
    let (b_dir, b_name) = split_path(b);
    (a_dir, a_name).cmp(&(b_dir, b_name))
}

/// Order rows within a block: `(basename, file_id)`.
pub fn compare_basename_id(a: (&[u8], &FileId), b: (&[u8], &FileId)) -> Ordering {
    a.0.cmp(b.0).then_with(|| a.1.as_bytes().cmp(b.1.as_bytes()))
}

/// Reject paths or file-ids that can't be represented in the NUL/LF-framed
/// on-disk row format, and reject `.`/`..` components (Open Question #2 in
/// spec.md §9: the original assumes these can't happen; we validate instead).
pub fn validate_entry_name(path: &[u8], file_id: &FileId) -> crate::error::Result<()> {
    let bad = |p: &[u8]| p.contains(&0) || p.contains(&b'\n');
    if bad(path) || bad(file_id.as_bytes()) {
        return Err(crate::error::Error::InvalidEntryName(path.to_vec()));
    }
    if path
        .split(|&b| b == b'/')
        .any(|part| part == b"." || part == b"..")
    {
        return Err(crate::error::Error::InvalidEntryName(path.to_vec()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sorts_before_everything() {
        assert_eq!(compare_dirs(b"", b"a"), Ordering::Less);
        assert_eq!(compare_dirs(b"a", b""), Ordering::Greater);
        assert_eq!(compare_dirs(b"", b""), Ordering::Equal);
    }

    #[test]
    fn component_order_not_bytewise() {
        // Bytewise: "a-b" < "a/b" because '-' (0x2d) < '/' (0x2f).
        assert!(b"a-b"[..] < b"a/b"[..]);
        // Component order: "a" < "a-b" (single component 'a' < 'a-b'), and
        // "a/b" sorts immediately after "a" and before "a-b".
        assert_eq!(compare_dirs(b"a", b"a-b"), Ordering::Less);
        assert_eq!(compare_dirs(b"a", b"a/b"), Ordering::Less);
        assert_eq!(compare_dirs(b"a/b", b"a-b"), Ordering::Less);
    }

    #[test]
    fn join_and_split_roundtrip() {
        assert_eq!(join_dir_and_name(b"", b"hello.txt"), b"hello.txt");
        assert_eq!(join_dir_and_name(b"dir", b"a.txt"), b"dir/a.txt");
        assert_eq!(split_path(b"hello.txt"), (Vec::new(), b"hello.txt".to_vec()));
        assert_eq!(
            split_path(b"dir/a.txt"),
            (b"dir".to_vec(), b"a.txt".to_vec())
        );
    }
}
