//! Partial reader: locate specific rows on disk without parsing the whole
//! body (§4.6, C6). Used for "what is at this path" lookups when nothing
//! has been mutated yet and the full `DirBlockStore` need not be built.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Error, Result};
use crate::format::Header;
use crate::key::{compare_dirs, split_path};
use crate::row::Row;

const INITIAL_PAGE_SIZE: u64 = 4096;

struct Task {
    low: u64,
    high: u64,
    page_size: u64,
    paths: Vec<Vec<u8>>,
}

fn io_err(path: &Path, e: std::io::Error) -> Error {
    Error::Io(path.to_path_buf(), e)
}

fn read_window(file: &mut File, path: &Path, offset: u64, want: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset)).map_err(|e| io_err(path, e))?;
    let mut buf = vec![0u8; want as usize];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf[total..]).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    Ok(buf)
}

/// `(absolute_start, absolute_end_exclusive, line_bytes)` for each complete
/// (newline-terminated) record in `window`, where `window` begins at file
/// offset `window_start`. The final element of a `split('\n')` is dropped
/// unless the window itself ends exactly on a `\n`, since a record that
/// isn't newline-terminated within the window is necessarily a partial
/// read, not a short final record (every on-disk row ends with `\n`).
fn complete_lines(window: &[u8], window_start: u64) -> Vec<(u64, u64, &[u8])> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some(nl) = window[pos..].iter().position(|&b| b == b'\n') {
        let abs_start = window_start + pos as u64;
        let abs_end = window_start + (pos + nl) as u64 + 1;
        out.push((abs_start, abs_end, &window[pos..pos + nl]));
        pos += nl + 1;
    }
    out
}

fn decode_line(line: &[u8], num_present_parents: usize) -> Result<Row> {
    let fields: Vec<&[u8]> = line.split(|&b| b == 0).collect();
    Row::decode(&fields, num_present_parents)
}

/// Generic bisection over the record stream, parameterised by how a row's
/// comparison key is extracted and how two keys are ordered. Full-path
/// lookups use [`compare_dirs`] against `row.key.path()`; directory-content
/// lookups use bytewise dirname comparison.
fn bisect<K, C>(
    file: &mut File,
    path: &Path,
    header: &Header,
    end_of_header: u64,
    targets: Vec<Vec<u8>>,
    key_of: K,
    cmp: C,
) -> Result<Vec<Row>>
where
    K: Fn(&Row) -> Vec<u8>,
    C: Fn(&[u8], &[u8]) -> Ordering,
{
    let file_size = file.metadata().map_err(|e| io_err(path, e))?.len();
    let num_present_parents = header.num_present_parents();

    let mut targets = targets;
    targets.sort_by(|a, b| cmp(a, b));
    targets.dedup();
    if targets.is_empty() || file_size <= end_of_header {
        return Ok(Vec::new());
    }

    let safety_limit = 30 * targets.len().max(1);
    let mut iterations = 0usize;
    let mut found = Vec::new();
    let mut worklist = vec![Task {
        low: end_of_header,
        high: file_size - 1,
        page_size: INITIAL_PAGE_SIZE,
        paths: targets,
    }];

    while let Some(mut task) = worklist.pop() {
        if task.paths.is_empty() || task.low > task.high {
            continue;
        }
        iterations += 1;
        if iterations > safety_limit {
            return Err(Error::Format(
                "dirstate bisector exceeded its iteration safety limit".into(),
            ));
        }

        let mid = task
            .low
            .max((task.low + task.high).saturating_sub(task.page_size) / 2);
        let want = task.page_size.min(task.high + 1 - mid);
        let window = read_window(file, path, mid, want)?;

        let lines = complete_lines(&window, mid);
        // `want` was capped by `page_size` rather than by the remaining
        // range, so a bigger page could still turn up more complete
        // records; when it was capped by range instead, there is nothing
        // more to read and we must proceed with what we have.
        if lines.len() < 2 && want == task.page_size {
            task.page_size = task.page_size.saturating_mul(2);
            worklist.push(task);
            continue;
        }
        if lines.is_empty() {
            return Err(Error::Format("dirstate body has an unterminated record".into()));
        }

        let first = &lines[0];
        let last = &lines[lines.len() - 1];
        let first_row = decode_line(first.2, num_present_parents)?;
        let last_row = decode_line(last.2, num_present_parents)?;
        let first_key = key_of(&first_row);
        let last_key = key_of(&last_row);
        let start = first.0;
        let after = last.1;

        let mut pre = Vec::new();
        let mut middle = Vec::new();
        let mut post = Vec::new();
        for p in task.paths {
            if cmp(&p, &first_key) == Ordering::Less {
                pre.push(p);
            } else if cmp(&p, &last_key) == Ordering::Greater {
                post.push(p);
            } else {
                middle.push(p);
            }
        }

        if !middle.is_empty() {
            for (_, _, line) in &lines {
                let row = decode_line(line, num_present_parents)?;
                let key = key_of(&row);
                if middle.iter().any(|p| cmp(p, &key) == Ordering::Equal) {
                    found.push(row);
                }
            }
        }

        if !pre.is_empty() {
            worklist.push(Task {
                low: task.low,
                high: start.saturating_sub(1),
                page_size: INITIAL_PAGE_SIZE,
                paths: pre,
            });
        }
        if !post.is_empty() {
            worklist.push(Task {
                low: after,
                high: task.high,
                page_size: INITIAL_PAGE_SIZE,
                paths: post,
            });
        }
    }

    Ok(found)
}

/// Locate the rows for specific full paths.
pub fn bisect_paths(
    file: &mut File,
    path: &Path,
    header: &Header,
    end_of_header: u64,
    targets: &[Vec<u8>],
) -> Result<Vec<Row>> {
    bisect(
        file,
        path,
        header,
        end_of_header,
        targets.to_vec(),
        |row| row.key.path(),
        compare_dirs,
    )
}

/// Locate every row whose `dirname` matches one of `dirnames` — i.e. the
/// directory-contents lookup. All candidates within the search share the
/// same set of parent directories so a plain bytewise comparison on
/// dirname suffices; component order is only needed across directories.
pub fn bisect_dir_contents(
    file: &mut File,
    path: &Path,
    header: &Header,
    end_of_header: u64,
    dirnames: &[Vec<u8>],
) -> Result<Vec<Row>> {
    bisect(
        file,
        path,
        header,
        end_of_header,
        dirnames.to_vec(),
        |row| row.key.dirname.clone(),
        |a, b| a.cmp(b),
    )
}

/// Repeatedly bisect until every directory reachable from `start_paths` —
/// including the targets of any `r` relocations encountered along the way
/// — has been read.
pub fn bisect_recursive(
    file: &mut File,
    path: &Path,
    header: &Header,
    end_of_header: u64,
    start_paths: &[Vec<u8>],
) -> Result<Vec<Row>> {
    let mut seen_dirs = std::collections::HashSet::new();
    let mut pending: Vec<Vec<u8>> = start_paths
        .iter()
        .map(|p| split_path(p).0)
        .collect();
    let mut all = Vec::new();

    while !pending.is_empty() {
        let batch: Vec<Vec<u8>> = pending
            .drain(..)
            .filter(|d| seen_dirs.insert(d.clone()))
            .collect();
        if batch.is_empty() {
            continue;
        }
        let rows = bisect_dir_contents(file, path, header, end_of_header, &batch)?;
        for row in &rows {
            if row.working_tree().minikind == crate::kind::MiniKind::Directory {
                pending.push(row.key.path());
            }
            for tree in &row.trees {
                if tree.minikind == crate::kind::MiniKind::Relocated {
                    pending.push(split_path(&tree.fingerprint).0);
                }
            }
        }
        all.extend(rows);
    }
    Ok(all)
}
