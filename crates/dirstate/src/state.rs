//! The `DirState` itself (§3 Lifecycle, C7): construction, locking, the
//! mutation API, and `save()`. Ties C1-C6 and C8-C10 together.

use std::path::{Path, PathBuf};

use bazaar::{FileId, RevisionId};
use log::{debug, info, warn};

use crate::block::DirBlockStore;
use crate::delta::{check_no_duplicate_file_ids, DeltaEntry};
use crate::error::{Error, Result};
use crate::format::{self, Header};
use crate::hash::HashProvider;
use crate::id_index::IdIndex;
use crate::inventory::{Inventory, InventoryEntry};
use crate::key::{compare_dirs, validate_entry_name, Key};
use crate::kind::{MiniKind, TreeDetails};
use crate::lock::{ReadLock, WriteLock};
use crate::packed_stat::PackedStat;
use crate::row::Row;
use crate::statcache;

/// Mirrors §3's lifecycle states. Not surfaced as public API beyond
/// `is_in_memory_modified`/`is_aborted`, but kept explicit because several
/// methods (`save`, `lock_write`) behave differently depending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    UnmodifiedOnDisk,
    InMemoryUnmodified,
    InMemoryModified,
}

enum Lock {
    None,
    Read(ReadLock),
    Write(WriteLock),
}

pub struct DirState {
    path: PathBuf,
    lock: Lock,
    state: LifecycleState,
    header_loaded: bool,
    parents: Vec<RevisionId>,
    ghosts: Vec<RevisionId>,
    blocks: DirBlockStore,
    id_index: Option<IdIndex>,
    aborted: bool,
}

impl DirState {
    /// Create a brand-new dirstate file at `path` containing a single root
    /// directory row with a sentinel packed stat (§3 Lifecycle).
    pub fn initialize(path: &Path) -> Result<Self> {
        let root_key = Key::root();
        let root_row = Row::new(
            root_key,
            vec![TreeDetails::new(
                MiniKind::Directory,
                Vec::new(),
                0,
                false,
                PackedStat::null().as_str().as_bytes().to_vec(),
            )],
        );
        let mut blocks = DirBlockStore::empty_skeleton();
        blocks.block_mut(0).rows.push(root_row);

        let mut state = DirState {
            path: path.to_path_buf(),
            lock: Lock::None,
            state: LifecycleState::InMemoryModified,
            header_loaded: true,
            parents: Vec::new(),
            ghosts: Vec::new(),
            blocks,
            id_index: None,
            aborted: false,
        };
        let write_lock = WriteLock::acquire(path)?;
        state.lock = Lock::Write(write_lock);
        state.save()?;
        state.unlock();
        Ok(state)
    }

    /// Open an existing dirstate file. The header is not read until a lock
    /// is held and the caller touches header-derived state (§3: "becomes
    /// usable only after acquiring a lock").
    pub fn on_file(path: &Path) -> Self {
        DirState {
            path: path.to_path_buf(),
            lock: Lock::None,
            state: LifecycleState::UnmodifiedOnDisk,
            header_loaded: false,
            parents: Vec::new(),
            ghosts: Vec::new(),
            blocks: DirBlockStore::new(),
            id_index: None,
            aborted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_in_memory_modified(&self) -> bool {
        self.state == LifecycleState::InMemoryModified
    }

    fn abort(&mut self, file_id: FileId, path: Vec<u8>, reason: impl Into<String>) -> Error {
        self.aborted = true;
        warn!(
            "dirstate inconsistency, aborting further saves: {} ({:?})",
            reason.into(),
            String::from_utf8_lossy(&path)
        );
        Error::InconsistentDelta {
            path,
            file_id,
            reason: "dirstate invariant violated".into(),
        }
    }

    // -- locking (C10) --------------------------------------------------

    pub fn lock_read(&mut self) -> Result<()> {
        if matches!(self.lock, Lock::Read(_) | Lock::Write(_)) {
            return Err(Error::LockContention(self.path.clone()));
        }
        let lock = ReadLock::acquire(&self.path)?;
        self.lock = Lock::Read(lock);
        self.ensure_header_loaded()?;
        Ok(())
    }

    pub fn lock_write(&mut self) -> Result<()> {
        if matches!(self.lock, Lock::Write(_)) {
            return Err(Error::LockContention(self.path.clone()));
        }
        let lock = match std::mem::replace(&mut self.lock, Lock::None) {
            Lock::None => Lock::Write(WriteLock::acquire(&self.path)?),
            Lock::Read(read) => match read.temporary_write_lock() {
                Ok(write) => Lock::Write(write),
                Err(read) => {
                    self.lock = Lock::Read(read);
                    return Err(Error::LockContention(self.path.clone()));
                }
            },
            Lock::Write(write) => Lock::Write(write),
        };
        self.lock = lock;
        self.ensure_header_loaded()?;
        Ok(())
    }

    /// Discard all in-memory state and release the lock (§5: "`unlock()`
    /// discards all in-memory state").
    pub fn unlock(&mut self) {
        match std::mem::replace(&mut self.lock, Lock::None) {
            Lock::None => {}
            Lock::Read(lock) => lock.release(),
            Lock::Write(lock) => lock.release(),
        }
        self.header_loaded = false;
        self.parents.clear();
        self.ghosts.clear();
        self.blocks = DirBlockStore::new();
        self.id_index = None;
        self.state = LifecycleState::UnmodifiedOnDisk;
        self.aborted = false;
    }

    fn ensure_header_loaded(&mut self) -> Result<()> {
        if self.header_loaded {
            return Ok(());
        }
        let file = match &mut self.lock {
            Lock::Read(l) => l.file_mut(),
            Lock::Write(l) => l.file_mut(),
            Lock::None => return Err(Error::LockNotHeld),
        };
        let (header, end_of_header) = format::read_header(file, &self.path)?;
        let rows = format::read_body(file, &self.path, &header)?;
        self.parents = header.parents;
        self.ghosts = header.ghosts;
        self.blocks = rows_into_blocks(rows);
        self.header_loaded = true;
        self.state = LifecycleState::InMemoryUnmodified;
        let _ = end_of_header;
        Ok(())
    }

    pub fn parents(&self) -> &[RevisionId] {
        &self.parents
    }

    pub fn ghosts(&self) -> &[RevisionId] {
        &self.ghosts
    }

    pub fn num_present_parents(&self) -> usize {
        self.parents.len() - self.ghosts.len()
    }

    fn id_index(&mut self) -> &mut IdIndex {
        let blocks = &self.blocks;
        self.id_index
            .get_or_insert_with(|| IdIndex::rebuild(blocks.iter_rows().map(|r| &r.key)))
    }

    fn invalidate_id_index(&mut self) {
        self.id_index = None;
    }

    fn mark_modified(&mut self) {
        self.state = LifecycleState::InMemoryModified;
    }

    pub fn blocks(&self) -> &DirBlockStore {
        &self.blocks
    }

    // -- save (C3, C10) ---------------------------------------------------

    /// Re-serialize and atomically replace the on-disk file, provided a
    /// write lock can be held (promoting from a read lock if necessary)
    /// and the aborted flag is not set (§3, §4.10).
    pub fn save(&mut self) -> Result<()> {
        if self.aborted {
            warn!("dirstate save suppressed: aborted flag is set");
            return Ok(());
        }
        if self.state != LifecycleState::InMemoryModified {
            return Ok(());
        }

        let promoted = match std::mem::replace(&mut self.lock, Lock::None) {
            Lock::Write(write) => (write, false),
            Lock::Read(read) => match read.temporary_write_lock() {
                Ok(write) => (write, true),
                Err(read) => {
                    self.lock = Lock::Read(read);
                    info!("dirstate save skipped: write-lock promotion failed");
                    return Ok(());
                }
            },
            Lock::None => return Err(Error::LockNotHeld),
        };
        let (mut write_lock, demote) = promoted;

        let rows: Vec<Row> = self.blocks.iter_rows().cloned().collect();
        let contents = format::serialize(&self.parents, &self.ghosts, &rows);
        debug!("dirstate save: {} rows, {} bytes, path={:?}", rows.len(), contents.len(), self.path);
        let result = format::write_in_place(write_lock.file_mut(), &self.path, &contents);

        self.lock = if demote {
            Lock::Read(write_lock.restore_read_lock())
        } else {
            Lock::Write(write_lock)
        };

        result?;
        self.state = LifecycleState::InMemoryUnmodified;
        Ok(())
    }

    // -- mutation API (C7) ------------------------------------------------

    /// Insert one row in the working-tree column (§4.7:
    /// `add(path, file_id, kind, stat, fingerprint)`). `stat` is the packed
    /// encoding of the file's current `stat(2)` result, or
    /// [`PackedStat::null`] when none is known yet.
    pub fn add(
        &mut self,
        path: &[u8],
        file_id: FileId,
        kind: MiniKind,
        stat: PackedStat,
        fingerprint: Vec<u8>,
        size: u64,
        executable: bool,
    ) -> Result<()> {
        validate_entry_name(path, &file_id)?;
        check_normalized(path)?;
        if let Some(existing) = self.id_index().get(&file_id).next().cloned() {
            return Err(Error::DuplicateFileId {
                file_id,
                existing_path: crate::key::join_dir_and_name(&existing.dirname, &existing.basename),
            });
        }
        let (dirname, basename) = crate::key::split_path(path);
        if !dirname.is_empty() && self.blocks.find_block_index(&dirname).is_err() {
            return Err(Error::NotVersioned(dirname));
        }
        let key = Key::new(dirname.clone(), basename.clone(), file_id.clone());
        if self.blocks.get(&key).is_some() {
            return Err(self.abort(file_id, path.to_vec(), "path already present"));
        }

        let num_parents = self.num_present_parents();
        let mut trees = vec![TreeDetails::new(
            kind,
            fingerprint,
            size,
            executable,
            stat.as_str().as_bytes().to_vec(),
        )];
        trees.extend(std::iter::repeat_with(TreeDetails::absent).take(num_parents));

        self.update_minimal(key, trees)?;

        if kind == MiniKind::Directory {
            self.blocks.ensure_block(path);
        }
        Ok(())
    }

    /// The lower-level insert/update (§4.7): installs `trees` at `key`,
    /// converting any pre-existing present row for this file-id into an
    /// `r` pointer while preserving its parent-tree columns (invariant 6).
    pub fn update_minimal(&mut self, key: Key, trees: Vec<TreeDetails>) -> Result<()> {
        let new_path = key.path();
        let existing_elsewhere: Vec<Key> = self
            .id_index()
            .get(&key.file_id)
            .map(|ik| Key::new(ik.dirname.clone(), ik.basename.clone(), key.file_id.clone()))
            .filter(|k| k != &key)
            .collect();

        for other in existing_elsewhere {
            if let Some(row) = self.blocks.get(&other).cloned() {
                if row.working_tree().is_present() {
                    let mut updated = row.clone();
                    *updated.working_tree_mut() = TreeDetails::relocated(new_path.clone());
                    self.replace_row(&other, updated);
                }
            }
        }

        let block_index = self.blocks.ensure_block(&key.dirname);
        match crate::block::DirBlockStore::find_row_index(self.blocks.block(block_index), &key.basename, &key.file_id) {
            Ok(row_index) => {
                self.blocks.block_mut(block_index).rows[row_index].trees = trees;
            }
            Err(row_index) => {
                self.blocks
                    .block_mut(block_index)
                    .rows
                    .insert(row_index, Row::new(key.clone(), trees));
            }
        }
        self.id_index().add(&key);
        self.mark_modified();
        Ok(())
    }

    fn replace_row(&mut self, key: &Key, row: Row) {
        if let Ok(block_index) = self.blocks.find_block_index(&key.dirname) {
            if let Ok(row_index) = crate::block::DirBlockStore::find_row_index(self.blocks.block(block_index), &key.basename, &key.file_id) {
                self.blocks.block_mut(block_index).rows[row_index] = row;
            }
        }
    }

    /// Mark the working-tree column absent; remove the row entirely if
    /// every column is now absent/relocated (§4.7 `_make_absent`).
    pub fn remove(&mut self, path: &[u8], file_id: &FileId) -> Result<()> {
        let (dirname, basename) = crate::key::split_path(path);
        let key = Key::new(dirname, basename, file_id.clone());
        let mut row = self
            .blocks
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotVersioned(path.to_vec()))?;

        *row.working_tree_mut() = TreeDetails::absent();
        let all_absent_or_relocated = row.trees.iter().all(|t| !t.is_present());

        if all_absent_or_relocated {
            if let Ok(block_index) = self.blocks.find_block_index(&key.dirname) {
                if let Ok(row_index) = crate::block::DirBlockStore::find_row_index(self.blocks.block(block_index), &key.basename, &key.file_id) {
                    self.blocks.block_mut(block_index).rows.remove(row_index);
                }
            }
            if let Some(idx) = self.id_index.as_mut() {
                idx.remove(&key);
            }
        } else {
            self.replace_row(&key, row);
        }

        // Invariant 6: other rows pointing at this key must no longer do so.
        let stale: Vec<Key> = self
            .blocks
            .iter_rows()
            .filter(|r| {
                r.key.file_id == *file_id
                    && r.working_tree().minikind == MiniKind::Relocated
                    && r.working_tree().fingerprint == path
            })
            .map(|r| r.key.clone())
            .collect();
        for stale_key in stale {
            if let Some(mut stale_row) = self.blocks.get(&stale_key).cloned() {
                *stale_row.working_tree_mut() = TreeDetails::absent();
                self.replace_row(&stale_key, stale_row);
            }
        }

        self.mark_modified();
        Ok(())
    }

    /// Refresh one working-tree entry's fingerprint against a fresh
    /// `stat()` of `full_path`, consulting the stat cache (§4.8, C8) so a
    /// cached fingerprint is reused whenever the stat says nothing has
    /// changed, instead of paying for a rehash on every call. `kind` and
    /// `executable` are the freshly observed values; the fingerprint is
    /// only recomputed via `hash_provider` when `statcache::classify`
    /// reports the entry actually changed (or changed too recently to
    /// cache).
    pub fn refresh_entry_stat(
        &mut self,
        path: &[u8],
        file_id: &FileId,
        kind: MiniKind,
        executable: bool,
        full_path: &Path,
        metadata: &std::fs::Metadata,
        hash_provider: &dyn HashProvider,
    ) -> Result<()> {
        let (dirname, basename) = crate::key::split_path(path);
        let key = Key::new(dirname, basename, file_id.clone());
        let existing = self.blocks.get(&key).cloned();

        let trust_cache = existing
            .as_ref()
            .filter(|row| row.working_tree().is_present())
            .map(|row| statcache::classify(row.working_tree(), kind, metadata) == statcache::StatResult::Unchanged)
            .unwrap_or(false);

        let working = if trust_cache {
            existing.as_ref().unwrap().working_tree().clone()
        } else {
            let fingerprint = if kind == MiniKind::File {
                hash_provider
                    .sha1_file(full_path)
                    .map_err(|e| Error::Io(full_path.to_path_buf(), e))?
                    .into_bytes()
            } else {
                Vec::new()
            };
            statcache::refreshed_details(kind, fingerprint, metadata.len(), executable, metadata)
        };

        let num_parents = self.num_present_parents();
        let mut trees = vec![working];
        match &existing {
            Some(row) => trees.extend(row.trees.iter().skip(1).cloned()),
            None => trees.extend(std::iter::repeat_with(TreeDetails::absent).take(num_parents)),
        }
        self.update_minimal(key, trees)
    }

    /// Root-only: rewrite the root row's file-id (§4.7: "`set_path_id`
    /// (root only)"). Matches the original `set_path_id(path, new_id)`
    /// signature, which raises for any path other than the root rather
    /// than silently ignoring it. The root's own row lives in the first of
    /// the two leading `""`-dirname blocks (invariant 3); it is addressed
    /// directly rather than through a key lookup, since `dirname == ""`
    /// alone cannot distinguish it from the second leading block holding
    /// the root directory's contents (see
    /// [`DirBlockStore::find_block_index`]).
    pub fn set_path_id(&mut self, path: &[u8], new_file_id: FileId) -> Result<()> {
        if !path.is_empty() {
            return Err(Error::NotImplemented(
                "set_path_id only supports the root path",
            ));
        }
        let old_root = self.blocks.block(0).rows.first().cloned();
        let Some(old_root) = old_root else {
            return Err(Error::NotVersioned(Vec::new()));
        };
        let new_key = Key::new(&b""[..], &b""[..], new_file_id);
        self.blocks.block_mut(0).rows.clear();
        self.blocks
            .block_mut(0)
            .rows
            .push(Row::new(new_key, old_root.trees));
        self.invalidate_id_index();
        self.mark_modified();
        Ok(())
    }

    /// Replace the working-tree column using a new authoritative
    /// enumeration, diffing it against the current state in component
    /// order (§4.7).
    pub fn set_state_from_inventory(&mut self, new_inventory: &dyn Inventory) -> Result<()> {
        let mut new_entries = new_inventory.entries();
        new_entries.sort_by(|a, b| compare_dirs(&a.path, &b.path));

        let mut current: Vec<(Vec<u8>, FileId, MiniKind, bool)> = self
            .blocks
            .iter_rows()
            .filter(|r| r.working_tree().is_present())
            .map(|r| {
                (
                    r.key.path(),
                    r.key.file_id.clone(),
                    r.working_tree().minikind,
                    r.working_tree().executable,
                )
            })
            .collect();
        current.sort_by(|a, b| compare_dirs(&a.0, &b.0));

        let mut ci = 0usize;
        let mut ni = 0usize;
        while ci < current.len() || ni < new_entries.len() {
            let cur = current.get(ci);
            let new = new_entries.get(ni);
            match (cur, new) {
                (Some(c), Some(n)) => match compare_dirs(&c.0, &n.path) {
                    std::cmp::Ordering::Equal => {
                        if c.2 != n.kind || c.3 != n.executable {
                            self.apply_inventory_entry(n)?;
                        }
                        ci += 1;
                        ni += 1;
                    }
                    std::cmp::Ordering::Less => {
                        self.remove(&c.0, &c.1)?;
                        ci += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        self.apply_inventory_entry(n)?;
                        ni += 1;
                    }
                },
                (Some(c), None) => {
                    self.remove(&c.0, &c.1)?;
                    ci += 1;
                }
                (None, Some(n)) => {
                    self.apply_inventory_entry(n)?;
                    ni += 1;
                }
                (None, None) => break,
            }
        }
        self.invalidate_id_index();
        self.mark_modified();
        Ok(())
    }

    fn apply_inventory_entry(&mut self, entry: &InventoryEntry) -> Result<()> {
        let (dirname, basename) = crate::key::split_path(&entry.path);
        let key = Key::new(dirname, basename, entry.file_id.clone());
        let num_parents = self.num_present_parents();
        let mut trees = vec![TreeDetails::new(
            entry.kind,
            entry.fingerprint.clone(),
            0,
            entry.executable,
            Vec::new(),
        )];
        trees.extend(std::iter::repeat_with(TreeDetails::absent).take(num_parents));
        self.update_minimal(key, trees)
    }

    /// Replace the parent list (§4.7). Each parent tree's entries are
    /// folded in as that tree's column; entries present only in a parent
    /// get a working-tree column of `a` so the row still exists to record
    /// the parent-tree content.
    pub fn set_parent_trees(&mut self, trees: &[Box<dyn Inventory>], ghosts: Vec<RevisionId>, revisions: Vec<RevisionId>) -> Result<()> {
        if revisions.len() != trees.len() + ghosts.len() {
            return Err(Error::Format(
                "set_parent_trees: revisions count must equal present + ghost parents".into(),
            ));
        }

        let working: Vec<(Key, TreeDetails)> = self
            .blocks
            .iter_rows()
            .map(|r| (r.key.clone(), r.working_tree().clone()))
            .collect();

        self.blocks = DirBlockStore::empty_skeleton();
        let num_parents = trees.len();
        for (key, wt) in &working {
            let mut row_trees = vec![wt.clone()];
            row_trees.extend(std::iter::repeat_with(TreeDetails::absent).take(num_parents));
            let block_index = if key.dirname.is_empty() && key.basename.is_empty() {
                0
            } else {
                self.blocks.ensure_block(&key.dirname)
            };
            self.blocks.block_mut(block_index).rows.push(Row::new(key.clone(), row_trees));
        }
        for block in self.blocks.blocks_mut() {
            block.rows.sort_by(|a, b| crate::key::compare_basename_id((&a.key.basename, &a.key.file_id), (&b.key.basename, &b.key.file_id)));
        }

        for (parent_index, tree) in trees.iter().enumerate() {
            let mut entries = tree.entries();
            entries.sort_by(|a, b| compare_dirs(&a.path, &b.path));
            for entry in &entries {
                let (dirname, basename) = crate::key::split_path(&entry.path);
                let key = Key::new(dirname.clone(), basename.clone(), entry.file_id.clone());
                let column = 1 + parent_index;
                let details = TreeDetails::new(entry.kind, entry.fingerprint.clone(), 0, entry.executable, Vec::new());
                if let Some(row) = self.blocks.get(&key).cloned() {
                    let mut updated = row;
                    updated.trees[column] = details;
                    self.replace_row(&key, updated);
                } else {
                    let mut row_trees = vec![TreeDetails::absent(); 1 + num_parents];
                    row_trees[column] = details;
                    let block_index = self.blocks.ensure_block(&dirname);
                    let row_index = match crate::block::DirBlockStore::find_row_index(self.blocks.block(block_index), &basename, &entry.file_id) {
                        Ok(i) | Err(i) => i,
                    };
                    self.blocks.block_mut(block_index).rows.insert(row_index, Row::new(key, row_trees));
                }
            }
        }

        self.parents = revisions;
        self.ghosts = ghosts;
        self.invalidate_id_index();
        self.mark_modified();
        Ok(())
    }

    /// Apply a sequence of `(old_path, new_path, file_id, new_entry)`
    /// records to the working-tree column (§4.7).
    pub fn update_by_delta(&mut self, delta: Vec<DeltaEntry>) -> Result<()> {
        check_no_duplicate_file_ids(&delta)?;
        for entry in delta {
            match (entry.old_path, entry.new_path, entry.new_entry) {
                (Some(old), None, None) => self.remove(&old, &entry.file_id)?,
                (None, Some(new), Some(new_entry)) => self.apply_inventory_entry(&new_entry)?,
                (Some(old), Some(new), Some(new_entry)) if old != new => {
                    // `apply_inventory_entry` (via `update_minimal`) finds the
                    // still-present row at `old` for this file-id and turns
                    // its working-tree column into an `r` pointer itself
                    // (invariant 6); calling `remove` first would mark it
                    // `a` instead and lose that pointer.
                    self.apply_inventory_entry(&new_entry)?;
                    self.reparent_children(&old, &new);
                }
                (Some(_), Some(_), Some(new_entry)) => self.apply_inventory_entry(&new_entry)?,
                _ => {
                    return Err(self.abort(entry.file_id, Vec::new(), "malformed delta record"));
                }
            }
        }
        self.invalidate_id_index();
        self.mark_modified();
        Ok(())
    }

    /// Children of a renamed directory keep the same basenames but move
    /// under the new dirname, and this descends into every nested
    /// subdirectory so the whole subtree is re-parented, not just the
    /// direct children (§4.7: "children of a renamed directory are
    /// re-parented to the new path"; grounded on the original's
    /// `_iter_child_entries`, which BFS-walks `pending_dirs` /
    /// `next_pending_dirs` the same way).
    fn reparent_children(&mut self, old_dir: &[u8], new_dir: &[u8]) {
        let mut pending_dirs = vec![(old_dir.to_vec(), new_dir.to_vec())];
        while let Some((old_dir, new_dir)) = pending_dirs.pop() {
            let affected: Vec<Key> = self
                .blocks
                .iter_rows()
                .filter(|r| r.key.dirname == old_dir)
                .map(|r| r.key.clone())
                .collect();
            for key in affected {
                if let Some(row) = self.blocks.get(&key).cloned() {
                    let is_dir = row.working_tree().minikind == MiniKind::Directory;
                    let old_path = key.path();
                    let new_key = Key::new(new_dir.clone(), key.basename.clone(), key.file_id.clone());
                    let new_path = new_key.path();
                    if let Ok(block_index) = self.blocks.find_block_index(&key.dirname) {
                        if let Ok(row_index) = crate::block::DirBlockStore::find_row_index(self.blocks.block(block_index), &key.basename, &key.file_id) {
                            self.blocks.block_mut(block_index).rows.remove(row_index);
                        }
                    }
                    let block_index = self.blocks.ensure_block(&new_dir);
                    let row_index = match crate::block::DirBlockStore::find_row_index(self.blocks.block(block_index), &new_key.basename, &new_key.file_id) {
                        Ok(i) | Err(i) => i,
                    };
                    self.blocks.block_mut(block_index).rows.insert(row_index, Row::new(new_key, row.trees));
                    if is_dir {
                        pending_dirs.push((old_path, new_path));
                    }
                }
            }
        }
    }

    /// Collapse all parents to a single parent `new_revid`, then apply
    /// `delta` to its column (§4.7).
    pub fn update_basis_by_delta(&mut self, delta: Vec<DeltaEntry>, new_revid: RevisionId) -> Result<()> {
        check_no_duplicate_file_ids(&delta)?;
        for block in self.blocks.blocks_mut() {
            for row in &mut block.rows {
                let working = row.trees[0].clone();
                row.trees = vec![working, TreeDetails::absent()];
            }
        }
        self.parents = vec![new_revid];
        self.ghosts.clear();

        for entry in delta {
            let old_path = entry.old_path;
            let new_path = entry.new_path;
            let new_entry = entry.new_entry;
            match (old_path, new_path, new_entry) {
                (Some(old), None, None) => {
                    let (dirname, basename) = crate::key::split_path(&old);
                    let key = Key::new(dirname, basename, entry.file_id.clone());
                    if let Some(mut row) = self.blocks.get(&key).cloned() {
                        row.trees[1] = TreeDetails::absent();
                        self.replace_row(&key, row);
                    } else {
                        return Err(self.abort(entry.file_id.clone(), old, "rename source absent from basis"));
                    }
                }
                (old, Some(new), Some(new_entry)) => {
                    let (dirname, basename) = crate::key::split_path(&new);
                    let key = Key::new(dirname, basename, entry.file_id.clone());
                    let details = TreeDetails::new(new_entry.kind, new_entry.fingerprint.clone(), 0, new_entry.executable, Vec::new());
                    if let Some(mut row) = self.blocks.get(&key).cloned() {
                        row.trees[1] = details;
                        self.replace_row(&key, row);
                    } else {
                        let block_index = self.blocks.ensure_block(&key.dirname);
                        let row_index = match crate::block::DirBlockStore::find_row_index(self.blocks.block(block_index), &key.basename, &key.file_id) {
                            Ok(i) | Err(i) => i,
                        };
                        self.blocks.block_mut(block_index).rows.insert(row_index, Row::new(key.clone(), vec![TreeDetails::absent(), details]));
                    }
                    if let Some(old) = old {
                        if old != new {
                            let (old_dirname, old_basename) = crate::key::split_path(&old);
                            let old_key = Key::new(old_dirname, old_basename, entry.file_id.clone());
                            if let Some(mut old_row) = self.blocks.get(&old_key).cloned() {
                                old_row.trees[1] = TreeDetails::absent();
                                self.replace_row(&old_key, old_row);
                            }
                            // A directory rename must move its descendants'
                            // rows too, exactly as the working-tree delta
                            // path does via the same helper.
                            self.reparent_children(&old, &new);
                        }
                    }
                }
                _ => {
                    return Err(self.abort(entry.file_id, Vec::new(), "malformed basis delta record"));
                }
            }
        }

        self.invalidate_id_index();
        self.mark_modified();
        Ok(())
    }

    // -- change iteration (C9) --------------------------------------------

    /// Compare the working tree on disk at `tree_root` against tree
    /// `target_index`, restricted to the directories reachable from
    /// `root_paths` (an empty slice means the whole tree; §4.9's `pending`
    /// root-path deduplication). Drives [`crate::bisect::bisect_recursive`]
    /// to build the restricted row set this relies on, rather than always
    /// materializing every block.
    pub fn iter_changes(
        &mut self,
        root_paths: &[Vec<u8>],
        tree_root: &Path,
        control_dir_name: &str,
        source_index: usize,
        target_index: usize,
        want_unversioned: bool,
        is_ignored: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<crate::changes::Change>> {
        let rows = self.rows_reachable_from(root_paths)?;
        Ok(crate::changes::iter_changes(
            &rows,
            tree_root,
            control_dir_name,
            source_index,
            target_index,
            want_unversioned,
            is_ignored,
        ))
    }

    fn rows_reachable_from(&mut self, root_paths: &[Vec<u8>]) -> Result<Vec<Row>> {
        if root_paths.is_empty() {
            self.ensure_header_loaded()?;
            return Ok(self.blocks.iter_rows().cloned().collect());
        }
        self.ensure_header_loaded()?;
        if self.state == LifecycleState::InMemoryModified {
            // The file on disk no longer matches in-memory state, so
            // bisecting it would miss uncommitted changes; walk the
            // in-memory blocks with the same reachability algorithm
            // instead.
            return Ok(self.rows_reachable_in_memory(root_paths));
        }
        let file = match &mut self.lock {
            Lock::Read(l) => l.file_mut(),
            Lock::Write(l) => l.file_mut(),
            Lock::None => return Err(Error::LockNotHeld),
        };
        let (header, end_of_header) = format::read_header(file, &self.path)?;
        crate::bisect::bisect_recursive(file, &self.path, &header, end_of_header, root_paths)
    }

    /// The in-memory equivalent of `bisect_recursive`'s reachability walk
    /// (same `pending`/`seen_dirs` shape), used when the file no longer
    /// reflects in-memory state.
    fn rows_reachable_in_memory(&self, start_paths: &[Vec<u8>]) -> Vec<Row> {
        let mut seen_dirs = std::collections::HashSet::new();
        let mut pending: Vec<Vec<u8>> = start_paths.iter().map(|p| crate::key::split_path(p).0).collect();
        let mut all = Vec::new();
        while let Some(dirname) = pending.pop() {
            if !seen_dirs.insert(dirname.clone()) {
                continue;
            }
            for row in self.blocks.iter_rows().filter(|r| r.key.dirname == dirname) {
                if row.working_tree().minikind == MiniKind::Directory {
                    pending.push(row.key.path());
                }
                for tree in &row.trees {
                    if tree.minikind == MiniKind::Relocated {
                        pending.push(crate::key::split_path(&tree.fingerprint).0);
                    }
                }
                all.push(row.clone());
            }
        }
        all
    }
}

/// §6's `NormalizeFilename`: refuse to add a path whose Unicode-normalized
/// form is not a filesystem-safe round-trip of the original (the form the
/// OS would actually hand back on lookup).
fn check_normalized(path: &[u8]) -> Result<()> {
    let Ok(path_str) = std::str::from_utf8(path) else {
        return Err(Error::InvalidEntryName(path.to_vec()));
    };
    if let Some((normalized, accessible)) = breezy_osutils::path::normalized_filename(Path::new(path_str)) {
        if !accessible || normalized.to_string_lossy().as_bytes() != path {
            return Err(Error::InvalidEntryName(path.to_vec()));
        }
    }
    Ok(())
}

fn rows_into_blocks(rows: Vec<Row>) -> DirBlockStore {
    let mut store = DirBlockStore::empty_skeleton();
    for row in rows {
        if row.key.dirname.is_empty() && row.key.basename.is_empty() {
            // The root's own row: always block 0, never resolved via
            // `ensure_block` (see `set_path_id`'s doc comment).
            store.block_mut(0).rows.push(row);
        } else {
            let block_index = store.ensure_block(&row.key.dirname);
            store.block_mut(block_index).rows.push(row);
        }
    }
    for block in store.blocks_mut() {
        block.rows.sort_by(|a, b| crate::key::compare_basename_id((&a.key.basename, &a.key.file_id), (&b.key.basename, &b.key.file_id)));
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::FlatInventory;

    #[test]
    fn initialize_then_reopen_roundtrips_the_root_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_read().unwrap();
        assert_eq!(state.blocks().blocks().len(), 2);
        assert_eq!(state.blocks().block(0).rows.len(), 1);
        assert_eq!(state.blocks().block(0).rows[0].key, Key::root());
        state.unlock();
    }

    #[test]
    fn add_then_save_then_reload_finds_the_new_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .add(
                b"hello.txt",
                FileId::from(&b"hello-id"[..]),
                MiniKind::File,
                PackedStat::null(),
                b"sha".to_vec(),
                5,
                false,
            )
            .unwrap();
        state.save().unwrap();
        state.unlock();

        let mut reopened = DirState::on_file(&path);
        reopened.lock_read().unwrap();
        let key = Key::new(&b""[..], &b"hello.txt"[..], FileId::from(&b"hello-id"[..]));
        assert!(reopened.blocks().get(&key).is_some());
        reopened.unlock();
    }

    #[test]
    fn add_duplicate_file_id_is_rejected_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .add(
                b"a.txt",
                FileId::from(&b"dup-id"[..]),
                MiniKind::File,
                PackedStat::null(),
                Vec::new(),
                0,
                false,
            )
            .unwrap();
        let err = state.add(
            b"b.txt",
            FileId::from(&b"dup-id"[..]),
            MiniKind::File,
            PackedStat::null(),
            Vec::new(),
            0,
            false,
        );
        assert!(matches!(err, Err(Error::DuplicateFileId { .. })));
        // A rejected `add` never mutated anything, so the dirstate is still
        // perfectly persistable (unlike an `InconsistentDelta` abort).
        assert!(!state.is_aborted());
    }

    #[test]
    fn remove_makes_row_absent_and_drops_it_when_no_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        let file_id = FileId::from(&b"a-id"[..]);
        state
            .add(b"a.txt", file_id.clone(), MiniKind::File, PackedStat::null(), Vec::new(), 0, false)
            .unwrap();
        state.remove(b"a.txt", &file_id).unwrap();
        let key = Key::new(&b""[..], &b"a.txt"[..], file_id);
        assert!(state.blocks().get(&key).is_none());
    }

    // S1: initialize then add.
    #[test]
    fn scenario_initialize_and_add() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        let stat = PackedStat::encode(5, 1000, 1000, 2, 3, 0o100644);
        state
            .add(
                b"hello.txt",
                FileId::from(&b"hello-id"[..]),
                MiniKind::File,
                stat.clone(),
                b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec(),
                5,
                false,
            )
            .unwrap();

        // The root's own row lives directly in block 0 (see `set_path_id`'s
        // doc comment): `get(&Key::root())` cannot be used here since
        // dirname `""` alone resolves to the *other* leading block.
        let root_row = &state.blocks().block(0).rows[0];
        assert_eq!(root_row.key, Key::root());
        assert_eq!(root_row.trees.len(), 1);
        assert_eq!(root_row.working_tree().minikind, MiniKind::Directory);
        assert!(PackedStat::from_bytes(&root_row.working_tree().packed_stat_or_revision).is_null());

        let hello_key = Key::new(&b""[..], &b"hello.txt"[..], FileId::from(&b"hello-id"[..]));
        let hello_row = state.blocks().get(&hello_key).unwrap();
        assert_eq!(hello_row.working_tree().minikind, MiniKind::File);
        assert_eq!(hello_row.working_tree().fingerprint, b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(hello_row.working_tree().size, 5);
        assert_eq!(hello_row.working_tree().packed_stat_or_revision, stat.as_str().as_bytes());

        state.save().unwrap();
        state.unlock();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(format::HEADER_FORMAT_3));
    }

    struct FixedHashProvider(&'static str);
    impl HashProvider for FixedHashProvider {
        fn sha1_file(&self, _path: &Path) -> std::io::Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn refresh_entry_stat_recomputes_fingerprint_on_a_new_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();
        let tree_dir = tempfile::tempdir().unwrap();
        let file_path = tree_dir.path().join("a.txt");
        std::fs::write(&file_path, b"hello").unwrap();
        let metadata = std::fs::metadata(&file_path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .refresh_entry_stat(
                b"a.txt",
                &FileId::from(&b"a-id"[..]),
                MiniKind::File,
                false,
                &file_path,
                &metadata,
                &FixedHashProvider("freshsha"),
            )
            .unwrap();

        let key = Key::new(&b""[..], &b"a.txt"[..], FileId::from(&b"a-id"[..]));
        let row = state.blocks().get(&key).unwrap();
        assert_eq!(row.working_tree().fingerprint, b"freshsha");
        assert_eq!(row.working_tree().size, metadata.len());
    }

    #[test]
    fn refresh_entry_stat_trusts_a_matching_cached_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();
        let tree_dir = tempfile::tempdir().unwrap();
        let file_path = tree_dir.path().join("a.txt");
        std::fs::write(&file_path, b"hello").unwrap();
        let metadata = std::fs::metadata(&file_path).unwrap();
        let packed = PackedStat::from_metadata(&metadata);

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .add(
                b"a.txt",
                FileId::from(&b"a-id"[..]),
                MiniKind::File,
                packed,
                b"cached-sha".to_vec(),
                metadata.len(),
                false,
            )
            .unwrap();

        // A hash provider that would panic if actually called proves the
        // cached fingerprint was trusted rather than recomputed.
        struct PanicsIfCalled;
        impl HashProvider for PanicsIfCalled {
            fn sha1_file(&self, _path: &Path) -> std::io::Result<String> {
                panic!("should not rehash an unchanged entry");
            }
        }

        state
            .refresh_entry_stat(
                b"a.txt",
                &FileId::from(&b"a-id"[..]),
                MiniKind::File,
                false,
                &file_path,
                &metadata,
                &PanicsIfCalled,
            )
            .unwrap();

        let key = Key::new(&b""[..], &b"a.txt"[..], FileId::from(&b"a-id"[..]));
        let row = state.blocks().get(&key).unwrap();
        assert_eq!(row.working_tree().fingerprint, b"cached-sha");
    }

    #[test]
    fn set_path_id_rewrites_the_root_file_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state.set_path_id(b"", FileId::from(&b"new-root-id"[..])).unwrap();
        assert_eq!(state.blocks().block(0).rows[0].key.file_id, FileId::from(&b"new-root-id"[..]));
    }

    #[test]
    fn set_path_id_on_non_root_path_is_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .add(b"a.txt", FileId::from(&b"a-id"[..]), MiniKind::File, PackedStat::null(), Vec::new(), 0, false)
            .unwrap();
        let err = state.set_path_id(b"a.txt", FileId::from(&b"new-id"[..]));
        assert!(matches!(err, Err(Error::NotImplemented(_))));
    }

    // S2: remove then re-add under the same name.
    #[test]
    fn scenario_remove_then_readd_under_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .add(
                b"hello.txt",
                FileId::from(&b"hello-id"[..]),
                MiniKind::File,
                PackedStat::null(),
                b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec(),
                5,
                false,
            )
            .unwrap();

        state.remove(b"hello.txt", &FileId::from(&b"hello-id"[..])).unwrap();
        state
            .add(
                b"hello.txt",
                FileId::from(&b"hello-id2"[..]),
                MiniKind::File,
                PackedStat::null(),
                b"bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_vec(),
                5,
                false,
            )
            .unwrap();

        let old_key = Key::new(&b""[..], &b"hello.txt"[..], FileId::from(&b"hello-id"[..]));
        assert!(state.blocks().get(&old_key).is_none());
        let new_key = Key::new(&b""[..], &b"hello.txt"[..], FileId::from(&b"hello-id2"[..]));
        assert!(state.blocks().get(&new_key).is_some());
    }

    // S3: rename via delta, with a one-parent row present in both columns.
    #[test]
    fn scenario_rename_via_delta_preserves_parent_column_and_leaves_relocation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .add(b"dir", FileId::from(&b"dir-id"[..]), MiniKind::Directory, PackedStat::null(), Vec::new(), 0, false)
            .unwrap();
        state
            .add(
                b"dir/a.txt",
                FileId::from(&b"a-id"[..]),
                MiniKind::File,
                PackedStat::null(),
                b"aaaa".to_vec(),
                4,
                false,
            )
            .unwrap();

        let parent = FlatInventory::new(vec![
            InventoryEntry {
                path: b"dir".to_vec(),
                file_id: FileId::from(&b"dir-id"[..]),
                kind: MiniKind::Directory,
                executable: false,
                fingerprint: Vec::new(),
            },
            InventoryEntry {
                path: b"dir/a.txt".to_vec(),
                file_id: FileId::from(&b"a-id"[..]),
                kind: MiniKind::File,
                executable: false,
                fingerprint: b"aaaa".to_vec(),
            },
        ]);
        let parent_trees: Vec<Box<dyn Inventory>> = vec![Box::new(parent)];
        state
            .set_parent_trees(&parent_trees, Vec::new(), vec![RevisionId::from(&b"rev-1"[..])])
            .unwrap();

        let delta = vec![DeltaEntry::rename(
            b"dir/a.txt".to_vec(),
            b"dir/b.txt".to_vec(),
            InventoryEntry {
                path: b"dir/b.txt".to_vec(),
                file_id: FileId::from(&b"a-id"[..]),
                kind: MiniKind::File,
                executable: false,
                fingerprint: b"bbbb".to_vec(),
            },
        )];
        state.update_by_delta(delta).unwrap();

        let new_key = Key::new(&b"dir"[..], &b"b.txt"[..], FileId::from(&b"a-id"[..]));
        let new_row = state.blocks().get(&new_key).unwrap();
        assert_eq!(new_row.working_tree().minikind, MiniKind::File);
        assert_eq!(new_row.working_tree().fingerprint, b"bbbb");

        let old_key = Key::new(&b"dir"[..], &b"a.txt"[..], FileId::from(&b"a-id"[..]));
        let old_row = state.blocks().get(&old_key).unwrap();
        assert_eq!(old_row.working_tree().minikind, MiniKind::Relocated);
        assert_eq!(old_row.working_tree().fingerprint, b"dir/b.txt");
        assert_eq!(old_row.trees[1].minikind, MiniKind::File);
        assert_eq!(old_row.trees[1].fingerprint, b"aaaa");
    }

    // S4: rename of a directory containing a file re-parents the child.
    #[test]
    fn scenario_rename_of_directory_reparents_child() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .add(b"old", FileId::from(&b"dir-id"[..]), MiniKind::Directory, PackedStat::null(), Vec::new(), 0, false)
            .unwrap();
        state
            .add(
                b"old/x",
                FileId::from(&b"x-id"[..]),
                MiniKind::File,
                PackedStat::null(),
                b"cccc".to_vec(),
                1,
                false,
            )
            .unwrap();

        let delta = vec![DeltaEntry::rename(
            b"old".to_vec(),
            b"new".to_vec(),
            InventoryEntry {
                path: b"new".to_vec(),
                file_id: FileId::from(&b"dir-id"[..]),
                kind: MiniKind::Directory,
                executable: false,
                fingerprint: Vec::new(),
            },
        )];
        state.update_by_delta(delta).unwrap();

        let dir_new_key = Key::new(&b""[..], &b"new"[..], FileId::from(&b"dir-id"[..]));
        let dir_new_row = state.blocks().get(&dir_new_key).unwrap();
        assert_eq!(dir_new_row.working_tree().minikind, MiniKind::Directory);

        let dir_old_key = Key::new(&b""[..], &b"old"[..], FileId::from(&b"dir-id"[..]));
        let dir_old_row = state.blocks().get(&dir_old_key).unwrap();
        assert_eq!(dir_old_row.working_tree().minikind, MiniKind::Relocated);

        let x_new_key = Key::new(&b"new"[..], &b"x"[..], FileId::from(&b"x-id"[..]));
        let x_new_row = state.blocks().get(&x_new_key).unwrap();
        assert_eq!(x_new_row.working_tree().minikind, MiniKind::File);
        assert_eq!(x_new_row.working_tree().fingerprint, b"cccc");
    }

    // S4b: rename of a directory containing a nested subdirectory
    // reparents the grandchild too, not just the direct child.
    #[test]
    fn scenario_rename_of_directory_reparents_nested_grandchild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .add(b"old", FileId::from(&b"old-id"[..]), MiniKind::Directory, PackedStat::null(), Vec::new(), 0, false)
            .unwrap();
        state
            .add(b"old/b", FileId::from(&b"b-id"[..]), MiniKind::Directory, PackedStat::null(), Vec::new(), 0, false)
            .unwrap();
        state
            .add(
                b"old/b/c.txt",
                FileId::from(&b"c-id"[..]),
                MiniKind::File,
                PackedStat::null(),
                b"cccc".to_vec(),
                4,
                false,
            )
            .unwrap();

        let delta = vec![DeltaEntry::rename(
            b"old".to_vec(),
            b"new".to_vec(),
            InventoryEntry {
                path: b"new".to_vec(),
                file_id: FileId::from(&b"old-id"[..]),
                kind: MiniKind::Directory,
                executable: false,
                fingerprint: Vec::new(),
            },
        )];
        state.update_by_delta(delta).unwrap();

        let b_new_key = Key::new(&b"new"[..], &b"b"[..], FileId::from(&b"b-id"[..]));
        let b_new_row = state.blocks().get(&b_new_key).unwrap();
        assert_eq!(b_new_row.working_tree().minikind, MiniKind::Directory);

        let c_new_key = Key::new(&b"new/b"[..], &b"c.txt"[..], FileId::from(&b"c-id"[..]));
        let c_new_row = state.blocks().get(&c_new_key).unwrap();
        assert_eq!(c_new_row.working_tree().minikind, MiniKind::File);
        assert_eq!(c_new_row.working_tree().fingerprint, b"cccc");

        let c_old_key = Key::new(&b"old/b"[..], &b"c.txt"[..], FileId::from(&b"c-id"[..]));
        assert!(state.blocks().get(&c_old_key).is_none());
    }

    // S7: directory rename applied via `update_basis_by_delta` reparents
    // the child row in the collapsed basis column too.
    #[test]
    fn update_basis_by_delta_reparents_child_on_directory_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstate");
        DirState::initialize(&path).unwrap();

        let mut state = DirState::on_file(&path);
        state.lock_write().unwrap();
        state
            .add(b"old", FileId::from(&b"dir-id"[..]), MiniKind::Directory, PackedStat::null(), Vec::new(), 0, false)
            .unwrap();
        state
            .add(
                b"old/x",
                FileId::from(&b"x-id"[..]),
                MiniKind::File,
                PackedStat::null(),
                b"cccc".to_vec(),
                1,
                false,
            )
            .unwrap();

        let delta = vec![DeltaEntry::rename(
            b"old".to_vec(),
            b"new".to_vec(),
            InventoryEntry {
                path: b"new".to_vec(),
                file_id: FileId::from(&b"dir-id"[..]),
                kind: MiniKind::Directory,
                executable: false,
                fingerprint: Vec::new(),
            },
        )];
        state.update_basis_by_delta(delta, RevisionId::from(&b"rev-2"[..])).unwrap();

        let dir_new_key = Key::new(&b""[..], &b"new"[..], FileId::from(&b"dir-id"[..]));
        assert!(state.blocks().get(&dir_new_key).is_some());

        let x_new_key = Key::new(&b"new"[..], &b"x"[..], FileId::from(&b"x-id"[..]));
        let x_new_row = state.blocks().get(&x_new_key).unwrap();
        assert_eq!(x_new_row.trees[0].minikind, MiniKind::File);

        let x_old_key = Key::new(&b"old"[..], &b"x"[..], FileId::from(&b"x-id"[..]));
        assert!(state.blocks().get(&x_old_key).is_none());
    }

    #[test]
    fn dirstate_iter_changes_reports_content_change_and_unversioned_file() {
        let state_dir = tempfile::tempdir().unwrap();
        let state_path = state_dir.path().join("dirstate");
        DirState::initialize(&state_path).unwrap();

        let tree_dir = tempfile::tempdir().unwrap();
        std::fs::write(tree_dir.path().join("tracked.txt"), b"new-content").unwrap();
        std::fs::write(tree_dir.path().join("extra.txt"), b"untracked").unwrap();

        let mut state = DirState::on_file(&state_path);
        state.lock_write().unwrap();
        state
            .add(
                b"tracked.txt",
                FileId::from(&b"tracked-id"[..]),
                MiniKind::File,
                PackedStat::null(),
                b"old-sha".to_vec(),
                3,
                false,
            )
            .unwrap();

        let changes = state
            .iter_changes(&[], tree_dir.path(), ".bzr", 0, 0, true, &|_| false)
            .unwrap();

        let tracked = changes
            .iter()
            .find(|c| c.new_path.as_deref() == Some(&b"tracked.txt"[..]))
            .unwrap();
        assert!(tracked.content_changed);

        let extra = changes
            .iter()
            .find(|c| c.new_path.as_deref() == Some(&b"extra.txt"[..]))
            .unwrap();
        assert_eq!(extra.versioned, (false, false));
    }

    #[test]
    fn dirstate_iter_changes_restricts_rows_via_bisect_when_root_paths_given() {
        let state_dir = tempfile::tempdir().unwrap();
        let state_path = state_dir.path().join("dirstate");
        DirState::initialize(&state_path).unwrap();

        {
            let mut state = DirState::on_file(&state_path);
            state.lock_write().unwrap();
            state
                .add(b"a.txt", FileId::from(&b"a-id"[..]), MiniKind::File, PackedStat::null(), b"sha".to_vec(), 3, false)
                .unwrap();
            state.save().unwrap();
            state.unlock();
        }

        let tree_dir = tempfile::tempdir().unwrap();
        std::fs::write(tree_dir.path().join("a.txt"), b"sha").unwrap();

        let mut state = DirState::on_file(&state_path);
        state.lock_read().unwrap();
        // Root-restricted and on-disk-unmodified: this exercises the
        // `bisect::bisect_recursive` path rather than the in-memory
        // fallback.
        let changes = state
            .iter_changes(&[Vec::new()], tree_dir.path(), ".bzr", 0, 0, false, &|_| false)
            .unwrap();
        assert!(changes.is_empty());
    }

    // S5: CRC detection is covered by `format::tests::corrupted_body_is_detected_by_crc`.

    // S6: bisect vs. full scan equivalence is covered by
    // `bisect::tests::bisect_finds_specific_paths_in_a_large_body`.
}
