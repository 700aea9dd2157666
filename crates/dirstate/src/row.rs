//! Serialize/deserialize one dirstate row to/from its NUL/NL framed bytes
//! (§4.2, C2). A row is `key(3 fields) + tree_columns(5 fields each)`,
//! joined by `\0` and terminated with `\n`.

use bazaar::FileId;

use crate::error::{Error, Result};
use crate::key::Key;
use crate::kind::{MiniKind, TreeDetails};

/// One fully materialized row: a key plus one `TreeDetails` per tree
/// column (column 0 is the working tree, 1..N are parents in order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: Key,
    pub trees: Vec<TreeDetails>,
}

impl Row {
    pub fn new(key: Key, trees: Vec<TreeDetails>) -> Self {
        Row { key, trees }
    }

    pub fn working_tree(&self) -> &TreeDetails {
        &self.trees[0]
    }

    pub fn working_tree_mut(&mut self) -> &mut TreeDetails {
        &mut self.trees[0]
    }

    /// `3 + 5 * tree_count + 1` — the number of NUL-separated fields a
    /// serialized row expands to, including the trailing (empty) newline
    /// field (§4.2).
    pub fn fields_per_entry(num_present_parents: usize) -> usize {
        let tree_count = 1 + num_present_parents;
        3 + 5 * tree_count + 1
    }

    /// Serialize to the NUL-joined field sequence that forms one line of
    /// the body (without the trailing `\n` — callers join rows with `\n`
    /// themselves, per §4.3's `( row "\n" )*`).
    pub fn encode(&self) -> Vec<u8> {
        let mut fields: Vec<Vec<u8>> = Vec::with_capacity(3 + 5 * self.trees.len());
        fields.push(self.key.dirname.clone());
        fields.push(self.key.basename.clone());
        fields.push(self.key.file_id.as_bytes().to_vec());
        for tree in &self.trees {
            fields.push(vec![tree.minikind.to_char() as u8]);
            fields.push(tree.fingerprint.clone());
            fields.push(tree.size.to_string().into_bytes());
            fields.push(if tree.executable { b"y".to_vec() } else { b"n".to_vec() });
            fields.push(tree.packed_stat_or_revision.clone());
        }
        fields.join(&b"\0"[..])
    }

    /// Parse one row's NUL-separated fields (as produced by splitting a
    /// body line on `\0`, i.e. *not* including the trailing empty-newline
    /// field) given the number of parent trees recorded in the dirstate.
    pub fn decode(fields: &[&[u8]], num_present_parents: usize) -> Result<Row> {
        let expected = 3 + 5 * (1 + num_present_parents);
        if fields.len() != expected {
            return Err(Error::Format(format!(
                "row has {} fields, expected {} for {} parent(s)",
                fields.len(),
                expected,
                num_present_parents
            )));
        }
        if !bazaar::is_valid(fields[2]) {
            return Err(Error::Format(format!(
                "invalid file id field: {:?}",
                String::from_utf8_lossy(fields[2])
            )));
        }
        let key = Key::new(fields[0].to_vec(), fields[1].to_vec(), FileId::from(fields[2]));
        let mut trees = Vec::with_capacity(1 + num_present_parents);
        let mut cur = 3;
        for _ in 0..(1 + num_present_parents) {
            let minikind = MiniKind::from_char(
                *fields[cur]
                    .first()
                    .ok_or_else(|| Error::Format("empty minikind field".into()))?,
            )?;
            let fingerprint = fields[cur + 1].to_vec();
            let size: u64 = std::str::from_utf8(fields[cur + 2])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::Format("non-numeric size field".into()))?;
            let executable = fields[cur + 3] == b"y";
            let packed_stat_or_revision = fields[cur + 4].to_vec();
            trees.push(TreeDetails::new(
                minikind,
                fingerprint,
                size,
                executable,
                packed_stat_or_revision,
            ));
            cur += 5;
        }
        Ok(Row { key, trees })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed_stat::PackedStat;

    fn sample_row() -> Row {
        Row::new(
            Key::new(&b""[..], &b"hello.txt"[..], FileId::from(&b"hello-id"[..])),
            vec![TreeDetails::new(
                MiniKind::File,
                b"a".repeat(40),
                5,
                false,
                PackedStat::null().as_str().as_bytes().to_vec(),
            )],
        )
    }

    #[test]
    fn encode_decode_roundtrip() {
        let row = sample_row();
        let encoded = row.encode();
        let fields: Vec<&[u8]> = encoded.split(|&b| b == 0).collect();
        let decoded = Row::decode(&fields, 0).unwrap();
        assert_eq!(row, decoded);
    }

    #[test]
    fn field_count_matches_formula() {
        assert_eq!(Row::fields_per_entry(0), 3 + 5 + 1);
        assert_eq!(Row::fields_per_entry(2), 3 + 15 + 1);
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let row = sample_row();
        let encoded = row.encode();
        let fields: Vec<&[u8]> = encoded.split(|&b| b == 0).collect();
        assert!(Row::decode(&fields, 1).is_err());
    }

    #[test]
    fn corrupted_file_id_field_is_a_format_error_not_a_panic() {
        let row = sample_row();
        let mut encoded = row.encode();
        let id_start = encoded.iter().position(|&b| b == 0).unwrap() + 1;
        let id_end = id_start + encoded[id_start..].iter().position(|&b| b == 0).unwrap();
        encoded.splice(id_start..id_end, std::iter::empty());
        let fields: Vec<&[u8]> = encoded.split(|&b| b == 0).collect();
        assert!(matches!(Row::decode(&fields, 0), Err(Error::Format(_))));
    }
}
