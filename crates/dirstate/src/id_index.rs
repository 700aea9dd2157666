//! Secondary index from file-id to the set of keys mentioning that id
//! (§4.5, C5). Built lazily, invalidated by mutations that rewrite large
//! regions, updated incrementally by the narrow mutations.

use std::collections::{HashMap, HashSet};

use bazaar::FileId;

use crate::key::Key;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub dirname: Vec<u8>,
    pub basename: Vec<u8>,
}

impl From<&Key> for IndexKey {
    fn from(k: &Key) -> Self {
        IndexKey {
            dirname: k.dirname.clone(),
            basename: k.basename.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct IdIndex {
    by_file_id: HashMap<FileId, HashSet<IndexKey>>,
}

impl IdIndex {
    pub fn new() -> Self {
        IdIndex::default()
    }

    /// Build from scratch by scanning every row of every block.
    pub fn rebuild<'a>(rows: impl Iterator<Item = &'a Key>) -> Self {
        let mut index = IdIndex::new();
        for key in rows {
            index.add(key);
        }
        index
    }

    pub fn add(&mut self, key: &Key) {
        self.by_file_id
            .entry(key.file_id.clone())
            .or_default()
            .insert(IndexKey::from(key));
    }

    pub fn remove(&mut self, key: &Key) {
        if let Some(set) = self.by_file_id.get_mut(&key.file_id) {
            set.remove(&IndexKey::from(key));
            if set.is_empty() {
                self.by_file_id.remove(&key.file_id);
            }
        }
    }

    pub fn get(&self, file_id: &FileId) -> impl Iterator<Item = &IndexKey> {
        self.by_file_id.get(file_id).into_iter().flatten()
    }

    pub fn contains(&self, file_id: &FileId) -> bool {
        self.by_file_id.contains_key(file_id)
    }

    pub fn file_ids(&self) -> impl Iterator<Item = &FileId> {
        self.by_file_id.keys()
    }
}
