//! In-memory ordered index of entries grouped by parent directory (§4.4,
//! C4). Blocks are sorted by component order (invariant 1); rows within a
//! block are sorted by `(basename, file_id)` (invariant 2).

use bazaar::FileId;

use crate::key::{compare_basename_id, compare_dirs, Key};
use crate::row::Row;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirBlock {
    pub dirname: Vec<u8>,
    pub rows: Vec<Row>,
}

impl DirBlock {
    pub fn new(dirname: impl Into<Vec<u8>>) -> Self {
        DirBlock {
            dirname: dirname.into(),
            rows: Vec::new(),
        }
    }
}

/// A small cache of the last resolved `(block_index, row_index)`, since
/// most access patterns are sequential across adjacent entries (§4.4).
#[derive(Debug, Default, Clone, Copy)]
struct LookupCache {
    last: Option<(usize, usize)>,
}

#[derive(Debug, Default)]
pub struct DirBlockStore {
    blocks: Vec<DirBlock>,
    cache: LookupCache,
}

impl DirBlockStore {
    pub fn new() -> Self {
        DirBlockStore::default()
    }

    /// The two special leading blocks (invariant 3): root's own row, and
    /// the root directory's contents.
    pub fn empty_skeleton() -> Self {
        let mut store = DirBlockStore::new();
        store.blocks.push(DirBlock::new(&b""[..]));
        store.blocks.push(DirBlock::new(&b""[..]));
        store
    }

    pub fn from_blocks(blocks: Vec<DirBlock>) -> Self {
        DirBlockStore {
            blocks,
            cache: LookupCache::default(),
        }
    }

    pub fn blocks(&self) -> &[DirBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Vec<DirBlock> {
        self.invalidate_cache();
        &mut self.blocks
    }

    pub fn invalidate_cache(&mut self) {
        self.cache.last = None;
    }

    pub fn len(&self) -> usize {
        self.blocks.iter().map(|b| b.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &Row> {
        self.blocks.iter().flat_map(|b| b.rows.iter())
    }

    pub fn iter_rows_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        self.blocks.iter_mut().flat_map(|b| b.rows.iter_mut())
    }

    /// Bisect for the block whose `dirname` equals `dirname`. `Ok(index)`
    /// if present, `Err(index)` with the insertion point otherwise. Except
    /// for the two leading `""` blocks (invariant 3), a dirname appears at
    /// most once so this is an ordinary binary search.
    pub fn find_block_index(&self, dirname: &[u8]) -> Result<usize, usize> {
        // The two leading blocks are both "" and sort equal to each other;
        // a plain binary search would be allowed to land on either. Since
        // every dirname other than "" is unique, this ambiguity only
        // matters for the root, which callers special-case.
        self.blocks
            .binary_search_by(|b| compare_dirs(&b.dirname, dirname))
    }

    /// Bisect within a block for the row with the given `(basename,
    /// file_id)` (invariant 2).
    pub fn find_row_index(block: &DirBlock, basename: &[u8], file_id: &FileId) -> Result<usize, usize> {
        block
            .rows
            .binary_search_by(|row| compare_basename_id((&row.key.basename, &row.key.file_id), (basename, file_id)))
    }

    /// Resolve a key to `(block_index, row_index)`, consulting then
    /// updating the sequential-access cache.
    pub fn locate(&mut self, key: &Key) -> Option<(usize, usize)> {
        if let Some((b, r)) = self.cache.last {
            if let Some(block) = self.blocks.get(b) {
                if block.dirname == key.dirname {
                    if let Some(row) = block.rows.get(r) {
                        if row.key.basename == key.basename && row.key.file_id == key.file_id {
                            return Some((b, r));
                        }
                    }
                }
            }
        }
        let block_index = self.find_block_index(&key.dirname).ok()?;
        let row_index = Self::find_row_index(&self.blocks[block_index], &key.basename, &key.file_id).ok()?;
        self.cache.last = Some((block_index, row_index));
        Some((block_index, row_index))
    }

    pub fn get(&self, key: &Key) -> Option<&Row> {
        let block_index = self.find_block_index(&key.dirname).ok()?;
        let row_index = Self::find_row_index(&self.blocks[block_index], &key.basename, &key.file_id).ok()?;
        self.blocks[block_index].rows.get(row_index)
    }

    /// Ensure a block for `dirname` exists, inserting an empty one in
    /// sorted position if not. Returns its index.
    pub fn ensure_block(&mut self, dirname: &[u8]) -> usize {
        self.invalidate_cache();
        match self.find_block_index(dirname) {
            Ok(idx) => idx,
            Err(idx) => {
                self.blocks.insert(idx, DirBlock::new(dirname.to_vec()));
                idx
            }
        }
    }

    pub fn block(&self, index: usize) -> &DirBlock {
        &self.blocks[index]
    }

    pub fn block_mut(&mut self, index: usize) -> &mut DirBlock {
        self.invalidate_cache();
        &mut self.blocks[index]
    }
}
