//! Change iterator (§4.9, C9): walk the dirstate and the filesystem in
//! parallel, in component order, and yield one record per differing path.

use std::path::{Path, PathBuf};

use bazaar::FileId;

use crate::key::compare_dirs;
use crate::kind::MiniKind;
use crate::row::Row;

/// `(file_id, (old_path, new_path), content_changed, (versioned_before,
/// versioned_after), (old_parent_id, new_parent_id), (old_basename,
/// new_basename), (old_kind, new_kind), (old_exec, new_exec))` (§4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub file_id: FileId,
    pub old_path: Option<Vec<u8>>,
    pub new_path: Option<Vec<u8>>,
    pub content_changed: bool,
    pub versioned: (bool, bool),
    pub parent_ids: (Option<FileId>, Option<FileId>),
    pub basenames: (Option<Vec<u8>>, Option<Vec<u8>>),
    pub kinds: (Option<MiniKind>, Option<MiniKind>),
    pub executables: (Option<bool>, Option<bool>),
    /// `None` when the dirstate cursor ran ahead of the filesystem (the
    /// path is missing on disk).
    pub disk_kind: Option<breezy_osutils::Kind>,
}

/// A filesystem entry found by the disk-side cursor.
#[derive(Debug, Clone)]
struct DiskEntry {
    path: Vec<u8>,
    kind: breezy_osutils::Kind,
}

fn relative_path(root: &Path, path: &Path) -> Vec<u8> {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
        .into_bytes()
}

/// Recursively walk `root`, pruning the control directory, returning disk
/// entries in component order (§4.9: "a recursive directory walk of the
/// working tree in the same order, with the control directory pruned").
/// An unknown directory (no row anywhere in `rows` has that path) is
/// reported itself but not descended into, per §4.9's "unknown directories
/// are not descended into" — its contents never get individual entries.
fn walk_disk(root: &Path, control_dir_name: &str, rows: &[Row]) -> Vec<DiskEntry> {
    let versioned: std::collections::HashSet<Vec<u8>> =
        rows.iter().map(|r| r.key.path()).collect();
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            if e.file_name() == control_dir_name {
                return false;
            }
            if e.file_type().is_dir() {
                versioned.contains(&relative_path(root, e.path()))
            } else {
                true
            }
        })
        .filter_map(|e| e.ok())
    {
        let relative = relative_path(root, entry.path());
        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            breezy_osutils::Kind::Directory
        } else if file_type.is_symlink() {
            breezy_osutils::Kind::Symlink
        } else {
            breezy_osutils::Kind::File
        };
        out.push(DiskEntry {
            path: relative,
            kind,
        });
    }
    out.sort_by(|a, b| compare_dirs(&a.path, &b.path));
    out
}

/// Follow an `r` relocation in `tree_index` to the row that actually holds
/// the present entry, per §4.9's "follow the relocation to the true source
/// row before comparing".
fn resolve_relocation<'a>(rows: &[&'a Row], row: &'a Row, tree_index: usize) -> Option<&'a Row> {
    let details = row.trees.get(tree_index)?;
    match details.minikind {
        MiniKind::Relocated => {
            let target_path = &details.fingerprint;
            rows.iter().copied().find(|r| &r.key.path() == target_path)
        }
        _ => Some(row),
    }
}

/// The file-id of the row whose full path equals `dirname` — i.e. the
/// versioned parent directory of a row with that dirname, used to fill in
/// `(old_parent_id, new_parent_id)` (§4.9).
fn parent_file_id(rows: &[&Row], dirname: &[u8]) -> Option<FileId> {
    rows.iter().find(|r| r.key.path() == dirname).map(|r| r.key.file_id.clone())
}

/// Produce the full change list between `source_index` and `target_index`
/// (usually 0 for the working tree) against the files physically present
/// under `tree_root`. `rows` must already be restricted to the blocks
/// reachable from the requested root paths; [`crate::state::DirState::iter_changes`]
/// is the caller that applies that restriction via
/// [`crate::bisect::bisect_recursive`] before calling down to this function.
///
/// This is not lazy (unlike the header's "lazy sequence of change
/// records") because the core has no generator/coroutine primitive to
/// reach for the way the original does; the full vector is still produced
/// in the same deterministic component order (§5's ordering guarantee).
pub fn iter_changes(
    rows: &[Row],
    tree_root: &Path,
    control_dir_name: &str,
    source_index: usize,
    target_index: usize,
    want_unversioned: bool,
    is_ignored: &dyn Fn(&[u8]) -> bool,
) -> Vec<Change> {
    let mut sorted_rows: Vec<&Row> = rows.iter().collect();
    sorted_rows.sort_by(|a, b| compare_dirs(&a.key.path(), &b.key.path()));
    let disk = walk_disk(tree_root, control_dir_name, rows);

    let mut changes = Vec::new();
    let mut ri = 0usize;
    let mut di = 0usize;

    while ri < sorted_rows.len() || di < disk.len() {
        let row_path = sorted_rows.get(ri).map(|r| r.key.path());
        let disk_path = disk.get(di).map(|d| d.path.clone());

        match (row_path.as_ref(), disk_path.as_ref()) {
            (Some(rp), Some(dp)) => match compare_dirs(rp, dp) {
                std::cmp::Ordering::Equal => {
                    emit_for_row(sorted_rows[ri], &sorted_rows, Some(&disk[di]), source_index, target_index, &mut changes);
                    ri += 1;
                    di += 1;
                }
                std::cmp::Ordering::Less => {
                    emit_for_row(sorted_rows[ri], &sorted_rows, None, source_index, target_index, &mut changes);
                    ri += 1;
                }
                std::cmp::Ordering::Greater => {
                    emit_unversioned(&disk[di], want_unversioned, is_ignored, &mut changes);
                    di += 1;
                }
            },
            (Some(_), None) => {
                emit_for_row(sorted_rows[ri], &sorted_rows, None, source_index, target_index, &mut changes);
                ri += 1;
            }
            (None, Some(_)) => {
                emit_unversioned(&disk[di], want_unversioned, is_ignored, &mut changes);
                di += 1;
            }
            (None, None) => break,
        }
    }

    changes
}

fn emit_unversioned(
    entry: &DiskEntry,
    want_unversioned: bool,
    is_ignored: &dyn Fn(&[u8]) -> bool,
    out: &mut Vec<Change>,
) {
    if !want_unversioned || is_ignored(&entry.path) {
        return;
    }
    out.push(Change {
        file_id: FileId::from(&b""[..]),
        old_path: None,
        new_path: Some(entry.path.clone()),
        content_changed: true,
        versioned: (false, false),
        parent_ids: (None, None),
        basenames: (None, crate::key::split_path(&entry.path).1.into()),
        kinds: (None, Some(MiniKind::from(entry.kind))),
        executables: (None, None),
        disk_kind: Some(entry.kind),
    });
}

fn emit_for_row(
    row: &Row,
    all_rows: &[&Row],
    disk: Option<&DiskEntry>,
    source_index: usize,
    target_index: usize,
    out: &mut Vec<Change>,
) {
    let source = row.trees.get(source_index);
    let target = row.trees.get(target_index);
    let (src_present, tgt_present) = (
        source.map(|t| t.is_present()).unwrap_or(false),
        target.map(|t| t.is_present()).unwrap_or(false),
    );
    let src_relocated = source.map(|t| t.minikind == MiniKind::Relocated).unwrap_or(false);
    let tgt_relocated = target.map(|t| t.minikind == MiniKind::Relocated).unwrap_or(false);

    // `a`/`r` on both sides: neither tree has a real entry here (§4.9's
    // silent-skip row of the case matrix).
    if !src_present && !tgt_present && !src_relocated && !tgt_relocated {
        return;
    }
    // This row is the old location of a rename; the canonical row at the
    // new path (reached separately, with `src_relocated` there instead)
    // carries the emission, so as not to report the same rename twice.
    if tgt_relocated && !src_present {
        return;
    }

    // `r` in the source column: the real earlier entry lives elsewhere;
    // follow it so the comparison sees genuine content rather than an
    // empty placeholder (§4.9: "follow the relocation to the true source
    // row before comparing").
    let (old_path, source) = if src_relocated {
        match resolve_relocation(all_rows, row, source_index) {
            Some(real) => (Some(real.key.path()), real.trees.get(source_index)),
            None => (None, None),
        }
    } else {
        (src_present.then(|| row.key.path()), source)
    };
    let src_present = source.map(|t| t.is_present()).unwrap_or(false);

    let new_path = row.key.path();
    let basename = row.key.basename.clone();
    let old_basename = old_path.as_deref().map(|p| crate::key::split_path(p).1);
    let disk_kind = disk.map(|d| d.kind);
    let parent_id = parent_file_id(all_rows, &row.key.dirname);

    let content_changed = match (source, target) {
        (Some(s), Some(t)) if src_present && tgt_present => {
            s.fingerprint != t.fingerprint || s.size != t.size || s.executable != t.executable
        }
        _ => true,
    };

    let any_field_differs = src_present != tgt_present
        || content_changed
        || source.map(|t| t.executable) != target.map(|t| t.executable)
        || old_path.as_deref() != Some(new_path.as_slice()) && src_present && tgt_present;

    if !any_field_differs {
        return;
    }

    out.push(Change {
        file_id: row.key.file_id.clone(),
        old_path: if src_present { old_path.clone() } else { None },
        new_path: if tgt_present { Some(new_path.clone()) } else { None },
        content_changed,
        versioned: (src_present, tgt_present),
        parent_ids: (
            src_present.then(|| parent_id.clone()).flatten(),
            tgt_present.then(|| parent_id.clone()).flatten(),
        ),
        basenames: (
            src_present.then(|| old_basename.clone()).flatten(),
            tgt_present.then(|| basename.clone()),
        ),
        kinds: (
            source.filter(|_| src_present).map(|t| t.minikind),
            target.filter(|_| tgt_present).map(|t| t.minikind),
        ),
        executables: (
            source.filter(|_| src_present).map(|t| t.executable),
            target.filter(|_| tgt_present).map(|t| t.executable),
        ),
        disk_kind,
    });
}

pub fn default_control_dir_name() -> &'static str {
    ".bzr"
}

pub fn tree_path(root: &Path, relative: &[u8]) -> PathBuf {
    root.join(String::from_utf8_lossy(relative).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::kind::TreeDetails;
    use crate::packed_stat::PackedStat;
    use std::fs;

    fn present_row(path: &[u8], file_id: &[u8]) -> Row {
        let (dirname, basename) = crate::key::split_path(path);
        Row::new(
            Key::new(dirname, basename, FileId::from(file_id)),
            vec![TreeDetails::new(
                MiniKind::File,
                b"deadbeef".to_vec(),
                3,
                false,
                PackedStat::null().as_str().as_bytes().to_vec(),
            )],
        )
    }

    fn present_dir_row(path: &[u8], file_id: &[u8]) -> Row {
        let (dirname, basename) = crate::key::split_path(path);
        Row::new(
            Key::new(dirname, basename, FileId::from(file_id)),
            vec![TreeDetails::new(
                MiniKind::Directory,
                Vec::new(),
                0,
                false,
                PackedStat::null().as_str().as_bytes().to_vec(),
            )],
        )
    }

    #[test]
    fn new_file_on_disk_is_reported_as_unversioned() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("untracked.txt"), b"hi").unwrap();
        let rows: Vec<Row> = vec![];
        let changes = iter_changes(&rows, dir.path(), ".bzr", 0, 0, true, &|_| false);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_path.as_deref(), Some(&b"untracked.txt"[..]));
    }

    #[test]
    fn ignored_unversioned_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ignored.pyc"), b"hi").unwrap();
        let rows: Vec<Row> = vec![];
        let changes = iter_changes(&rows, dir.path(), ".bzr", 0, 0, true, &|p| p.ends_with(b".pyc"));
        assert!(changes.is_empty());
    }

    #[test]
    fn unknown_directory_is_reported_once_and_not_descended_into() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("junk")).unwrap();
        fs::write(dir.path().join("junk/a.txt"), b"a").unwrap();
        fs::write(dir.path().join("junk/b.txt"), b"b").unwrap();
        let rows: Vec<Row> = vec![];
        let changes = iter_changes(&rows, dir.path(), ".bzr", 0, 0, true, &|_| false);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_path.as_deref(), Some(&b"junk"[..]));
        assert_eq!(changes[0].disk_kind, Some(breezy_osutils::Kind::Directory));
    }

    #[test]
    fn versioned_directory_is_still_descended_into() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.txt"), b"hi").unwrap();
        let rows = vec![
            present_dir_row(b"src", b"src-id"),
            present_row(b"src/a.txt", b"a-id"),
        ];
        let changes = iter_changes(&rows, dir.path(), ".bzr", 0, 0, true, &|_| false);
        // `src` is versioned, so the walk must descend into it and compare
        // `src/a.txt` too, rather than stopping at the directory.
        let paths: Vec<&[u8]> = changes.iter().filter_map(|c| c.new_path.as_deref()).collect();
        assert!(paths.contains(&&b"src/a.txt"[..]));
    }

    #[test]
    fn missing_versioned_file_is_reported_with_no_disk_kind() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![present_row(b"gone.txt", b"gone-id")];
        let changes = iter_changes(&rows, dir.path(), ".bzr", 0, 0, false, &|_| false);
        assert_eq!(changes.len(), 1);
        assert!(changes[0].disk_kind.is_none());
        assert_eq!(changes[0].versioned, (true, true));
    }
}
