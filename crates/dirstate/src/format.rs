//! On-disk file layout: header, CRC, parent/ghost lines, body of rows
//! (§4.3), plus the crash-safe write protocol used by `save()`.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bazaar::RevisionId;

use crate::error::{Error, Result};
use crate::row::Row;

pub const HEADER_FORMAT_3: &[u8] = b"#bazaar dirstate flat format 3\n";

/// The header + parent/ghost metadata, decoupled from the (possibly not
/// yet loaded) row data so the bisector (C6) can read just this part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub crc_expected: u32,
    pub num_entries: usize,
    pub parents: Vec<RevisionId>,
    pub ghosts: Vec<RevisionId>,
}

impl Header {
    pub fn num_present_parents(&self) -> usize {
        self.parents.len() - self.ghosts.len()
    }
}

fn io_err(path: &Path, e: std::io::Error) -> Error {
    Error::Io(path.to_path_buf(), e)
}

fn read_line(r: &mut impl Read, path: &Path) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = r.read(&mut byte).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        out.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    Ok(out)
}

fn ids_line(count_and_ids: &[u8]) -> Result<Vec<RevisionId>> {
    let line = count_and_ids
        .strip_suffix(b"\n")
        .ok_or_else(|| Error::Format("parent/ghost line missing trailing newline".into()))?;
    let mut fields = line.split(|&b| b == 0);
    let count: usize = fields
        .next()
        .and_then(|f| std::str::from_utf8(f).ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Format("bad parent/ghost count".into()))?;
    let ids: Vec<RevisionId> = fields.map(RevisionId::from).collect();
    if ids.len() != count {
        return Err(Error::Format(format!(
            "parent/ghost line declares {} ids but has {}",
            count,
            ids.len()
        )));
    }
    Ok(ids)
}

fn encode_ids_line(ids: &[RevisionId]) -> Vec<u8> {
    let mut fields: Vec<Vec<u8>> = vec![ids.len().to_string().into_bytes()];
    fields.extend(ids.iter().map(|id| id.as_bytes().to_vec()));
    let mut line = fields.join(&b"\0"[..]);
    line.push(b'\n');
    line
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Read the header, parent line and ghost line from an open file, leaving
/// the cursor positioned at the start of the body (`end_of_header`).
pub fn read_header(f: &mut std::fs::File, path: &Path) -> Result<(Header, u64)> {
    f.seek(SeekFrom::Start(0)).map_err(|e| io_err(path, e))?;
    let header_line = read_line(f, path)?;
    if header_line != HEADER_FORMAT_3 {
        return Err(Error::Format(format!(
            "invalid header line: {:?}",
            String::from_utf8_lossy(&header_line)
        )));
    }
    let crc_line = read_line(f, path)?;
    let crc_expected: u32 = crc_line
        .strip_prefix(b"crc32: ")
        .and_then(|rest| rest.strip_suffix(b"\n"))
        .and_then(|rest| std::str::from_utf8(rest).ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Format("missing crc32 line".into()))?;
    let num_entries_line = read_line(f, path)?;
    let num_entries: usize = num_entries_line
        .strip_prefix(b"num_entries: ")
        .and_then(|rest| rest.strip_suffix(b"\n"))
        .and_then(|rest| std::str::from_utf8(rest).ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Format("missing num_entries line".into()))?;
    let parent_line = read_line(f, path)?;
    let parents = ids_line(&parent_line)?;
    let ghost_line = read_line(f, path)?;
    let ghosts = ids_line(&ghost_line)?;
    let end_of_header = f.stream_position().map_err(|e| io_err(path, e))?;
    Ok((
        Header {
            crc_expected,
            num_entries,
            parents,
            ghosts,
        },
        end_of_header,
    ))
}

/// Read the full body (everything after the header) and verify its CRC,
/// returning the parsed rows.
pub fn read_body(f: &mut std::fs::File, path: &Path, header: &Header) -> Result<Vec<Row>> {
    let mut body = Vec::new();
    f.read_to_end(&mut body).map_err(|e| io_err(path, e))?;
    let mut crc_input = encode_ids_line(&header.parents);
    crc_input.extend(encode_ids_line(&header.ghosts));
    crc_input.extend_from_slice(&body);
    let actual = crc32(&crc_input);
    if actual != header.crc_expected {
        return Err(Error::Format(format!(
            "crc32 mismatch: expected {}, got {}",
            header.crc_expected, actual
        )));
    }
    let num_present_parents = header.num_present_parents();
    let mut lines: Vec<&[u8]> = body.split(|&b| b == b'\n').collect();
    // The final "\n" produces a trailing empty element; drop it.
    if lines.last() == Some(&&b""[..]) {
        lines.pop();
    }
    if lines.len() != header.num_entries {
        return Err(Error::Format(format!(
            "num_entries says {} but body has {} rows",
            header.num_entries,
            lines.len()
        )));
    }
    lines
        .into_iter()
        .map(|line| {
            let fields: Vec<&[u8]> = line.split(|&b| b == 0).collect();
            Row::decode(&fields, num_present_parents)
        })
        .collect()
}

/// Render a complete dirstate file's bytes from its parents, ghosts and
/// rows, computing the CRC as the writer does (§4.3).
pub fn serialize(parents: &[RevisionId], ghosts: &[RevisionId], rows: &[Row]) -> Vec<u8> {
    let parent_line = encode_ids_line(parents);
    let ghost_line = encode_ids_line(ghosts);
    let mut body = Vec::new();
    for row in rows {
        body.extend(row.encode());
        body.push(b'\n');
    }

    let mut crc_input = parent_line.clone();
    crc_input.extend(&ghost_line);
    crc_input.extend(&body);
    let crc = crc32(&crc_input);

    let mut out = Vec::new();
    out.extend_from_slice(HEADER_FORMAT_3);
    out.extend(format!("crc32: {}\n", crc).into_bytes());
    out.extend(format!("num_entries: {}\n", rows.len()).into_bytes());
    out.extend(parent_line);
    out.extend(ghost_line);
    out.extend(body);
    out
}

/// Write `contents` into `file` in place: seek to 0, write, truncate,
/// flush. The caller is responsible for holding (or having just promoted
/// to) a write lock on `file` (§4.3, §4.10).
pub fn write_in_place(file: &mut std::fs::File, path: &Path, contents: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(0)).map_err(|e| io_err(path, e))?;
    file.write_all(contents).map_err(|e| io_err(path, e))?;
    let len = contents.len() as u64;
    file.set_len(len).map_err(|e| io_err(path, e))?;
    file.flush().map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::kind::{MiniKind, TreeDetails};
    use crate::packed_stat::PackedStat;
    use bazaar::FileId;
    use std::io::Write as _;

    fn root_row() -> Row {
        Row::new(
            Key::new(&b""[..], &b""[..], FileId::from(&b"TREE_ROOT"[..])),
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
    fn serialize_then_parse_roundtrips() {
        let rows = vec![root_row()];
        let bytes = serialize(&[], &[], &rows);
        assert!(bytes.starts_with(HEADER_FORMAT_3));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        std::fs::write(&path, &bytes).unwrap();
        let mut f = std::fs::File::open(&path).unwrap();
        let (header, _end) = read_header(&mut f, &path).unwrap();
        assert_eq!(header.parents.len(), 0);
        assert_eq!(header.num_entries, 1);
        let parsed_rows = read_body(&mut f, &path, &header).unwrap();
        assert_eq!(parsed_rows, rows);
    }

    #[test]
    fn corrupted_body_is_detected_by_crc() {
        let rows = vec![root_row()];
        let mut bytes = serialize(&[], &[], &rows);
        // Flip a byte inside the body without touching the header/CRC line.
        let body_start = bytes.len() - 5;
        bytes[body_start] ^= 0xFF;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        std::fs::write(&path, &bytes).unwrap();
        let mut f = std::fs::File::open(&path).unwrap();
        let (header, _end) = read_header(&mut f, &path).unwrap();
        let err = read_body(&mut f, &path, &header).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn bad_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not a dirstate file\n").unwrap();
        drop(f);
        let mut f = std::fs::File::open(&path).unwrap();
        assert!(read_header(&mut f, &path).is_err());
    }
}
