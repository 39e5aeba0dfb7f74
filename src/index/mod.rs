//! The B+-tree index itself: construction over a relation scan, point
//! insertion, and range scans, layered entirely on the buffer pool manager.
//!
//! Opening an index file that already exists and building one from scratch
//! are surfaced as two distinct entry points, [`BTreeIndex::build`] and
//! [`BTreeIndex::open`], since their inputs differ (`build` needs a
//! [`RelationFile`] to scan; `open` does not) — the same two code paths, just
//! named instead of dispatched on a runtime check of something the caller
//! already knows.

mod node;
mod scan;

pub use node::AttrType;
pub use scan::Operator;

use crate::buffer_pool::BufferPoolManager;
use crate::disk::PagedFile;
use crate::errors::Error;
use crate::page::{PageId, INVALID_PAGE_ID};
use crate::printdbg;
use crate::record_id::RecordId;
use crate::relation::RelationFile;
use anyhow::Result;
use node::{LeafNode, MetadataPage, NonLeafNode, LEAF_OCCUPANCY, NODE_OCCUPANCY};
use scan::ScanState;
use std::path::{Path, PathBuf};
use std::rc::Rc;

fn index_dir(data_dir: &Path, relation_name: &str, attr_offset: u32) -> PathBuf {
    data_dir.join(format!("{relation_name}.{attr_offset}"))
}

/// A B+-tree index over one integer attribute of one relation, backed by its
/// own [`PagedFile`] and a private [`BufferPoolManager`].
pub struct BTreeIndex {
    bpm: BufferPoolManager,
    file: Rc<PagedFile>,
    meta_page_id: PageId,
    root_page_num: PageId,
    is_root_leaf: bool,
    relation_name: String,
    attr_offset: u32,
    attr_type: AttrType,
    scan: Option<ScanState>,
}

impl BTreeIndex {
    /// Builds a brand-new index file named `"{relation}.{attr_offset}"`,
    /// scanning `relation` once to populate it.
    pub fn build(
        data_dir: &Path,
        relation_name: &str,
        attr_offset: u32,
        attr_type: AttrType,
        buffer_pool_frames: usize,
        relation: &RelationFile,
    ) -> Result<Self> {
        let dir = index_dir(data_dir, relation_name, attr_offset);
        let file = Rc::new(PagedFile::create(&dir)?);
        let mut bpm = BufferPoolManager::new(buffer_pool_frames);

        // Page 1 is always the metadata page on a freshly created file; its
        // contents are written only once construction finishes.
        let (meta_page_id, _) = bpm.alloc_page(&file)?;
        bpm.unpin_page(&file, meta_page_id, false)?;

        let (root_page_num, root_page) = bpm.alloc_page(&file)?;
        LeafNode::new(root_page).init_empty();
        bpm.unpin_page(&file, root_page_num, true)?;

        let mut index = Self {
            bpm,
            file,
            meta_page_id,
            root_page_num,
            is_root_leaf: true,
            relation_name: relation_name.to_string(),
            attr_offset,
            attr_type,
            scan: None,
        };

        for entry in relation.scan(attr_offset as usize)? {
            let (rid, key) = entry?;
            index.insert_entry(key, rid)?;
        }

        {
            let meta_page = index.bpm.read_page(&index.file, index.meta_page_id)?;
            MetadataPage::new(meta_page).write(
                &index.relation_name,
                index.attr_offset,
                index.attr_type,
                index.root_page_num,
                index.is_root_leaf,
            );
        }
        index.bpm.unpin_page(&index.file, index.meta_page_id, true)?;

        printdbg!("built index {relation_name}.{attr_offset}");
        Ok(index)
    }

    /// Reopens an existing index file, validating its metadata against the
    /// requested relation name, attribute offset, and attribute type.
    pub fn open(
        data_dir: &Path,
        relation_name: &str,
        attr_offset: u32,
        attr_type: AttrType,
        buffer_pool_frames: usize,
    ) -> Result<Self> {
        let dir = index_dir(data_dir, relation_name, attr_offset);
        let file = Rc::new(PagedFile::open(&dir)?);
        let mut bpm = BufferPoolManager::new(buffer_pool_frames);

        let meta_page_id: PageId = 1;
        let (matches, root_page_num, is_root_leaf) = {
            let meta_page = bpm.read_page(&file, meta_page_id)?;
            let meta = MetadataPage::new(meta_page);
            let matches = meta.relation_name() == relation_name
                && meta.attr_offset() == attr_offset
                && meta.attr_type() == attr_type;
            (matches, meta.root_page_num(), meta.is_root_leaf())
        };
        bpm.unpin_page(&file, meta_page_id, false)?;

        if !matches {
            return Err(Error::BadIndexInfo.into());
        }

        printdbg!("opened index {relation_name}.{attr_offset}");
        Ok(Self {
            bpm,
            file,
            meta_page_id,
            root_page_num,
            is_root_leaf,
            relation_name: relation_name.to_string(),
            attr_offset,
            attr_type,
            scan: None,
        })
    }

    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    pub fn attr_offset(&self) -> u32 {
        self.attr_offset
    }

    /// Inserts one `(key, rid)` entry, descending from the root and
    /// splitting leaves/non-leaf nodes as needed.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        if self.is_root_leaf {
            self.insert_into_leaf(self.root_page_num, key, rid, &mut Vec::new())
        } else {
            let mut path = Vec::new();
            let leaf_pid = self.search_nodes(self.root_page_num, key, &mut path)?;
            self.insert_into_leaf(leaf_pid, key, rid, &mut path)
        }
    }

    /// Iterative descent from `start` to the leaf that should hold `key`,
    /// pushing every non-leaf page visited onto `path` so a later split can
    /// propagate back up without recursion.
    fn search_nodes(&mut self, start: PageId, key: i32, path: &mut Vec<PageId>) -> Result<PageId> {
        let mut cur = start;
        loop {
            path.push(cur);
            let (level, child) = {
                let page = self.bpm.read_page(&self.file, cur)?;
                let node = NonLeafNode::new(page);
                (node.level(), node.find_child(key))
            };
            self.bpm.unpin_page(&self.file, cur, false)?;

            if level == 1 {
                return Ok(child);
            }
            cur = child;
        }
    }

    /// Descends non-leaf nodes from `start` to locate the leaf that would
    /// hold `key`, without recording a path (used by `start_scan`, which
    /// never needs to propagate a split back up).
    fn search_key(&mut self, start: PageId, key: i32) -> Result<PageId> {
        let mut cur = start;
        loop {
            let (level, child) = {
                let page = self.bpm.read_page(&self.file, cur)?;
                let node = NonLeafNode::new(page);
                (node.level(), node.find_child(key))
            };
            self.bpm.unpin_page(&self.file, cur, false)?;

            if level == 1 {
                return Ok(child);
            }
            cur = child;
        }
    }

    fn insert_into_leaf(
        &mut self,
        pid: PageId,
        key: i32,
        rid: RecordId,
        path: &mut Vec<PageId>,
    ) -> Result<()> {
        let full = {
            let page = self.bpm.read_page(&self.file, pid)?;
            let mut leaf = LeafNode::new(page);
            let full = leaf.is_full();
            if !full {
                leaf.insert_sorted(key, rid);
            }
            full
        };

        if full {
            self.bpm.unpin_page(&self.file, pid, false)?;
            self.split_leaf(pid, key, rid, path)
        } else {
            self.bpm.unpin_page(&self.file, pid, true)?;
            Ok(())
        }
    }

    /// Splits a full leaf using the even/odd `LEAF_OCCUPANCY` threshold rule,
    /// then re-inserts `(key, rid)` on whichever side has room and propagates
    /// the right sibling's minimum key upward.
    fn split_leaf(
        &mut self,
        pid: PageId,
        key: i32,
        rid: RecordId,
        path: &mut Vec<PageId>,
    ) -> Result<()> {
        const C: usize = LEAF_OCCUPANCY;

        let (thresh, new_key_left, old_right_sib, moved): (usize, bool, PageId, Vec<(i32, RecordId)>) = {
            let page = self.bpm.read_page(&self.file, pid)?;
            let leaf = LeafNode::new(page);
            let (thresh, new_key_left) = if C % 2 == 0 {
                if leaf.key_at(C / 2 - 1) > key {
                    (C / 2 - 1, true)
                } else {
                    (C / 2, false)
                }
            } else if leaf.key_at(C / 2) > key {
                (C / 2, true)
            } else {
                (C / 2 + 1, false)
            };
            let moved = (thresh..C).map(|i| (leaf.key_at(i), leaf.rid_at(i))).collect();
            (thresh, new_key_left, leaf.right_sib(), moved)
        };
        self.bpm.unpin_page(&self.file, pid, false)?;

        let (right_pid, right_page) = self.bpm.alloc_page(&self.file)?;
        {
            let mut right = LeafNode::new(right_page);
            right.init_empty();
            for (k, r) in &moved {
                right.insert_sorted(*k, *r);
            }
            right.set_right_sib(old_right_sib);
        }
        self.bpm.unpin_page(&self.file, right_pid, true)?;

        {
            let page = self.bpm.read_page(&self.file, pid)?;
            let mut leaf = LeafNode::new(page);
            leaf.truncate(thresh);
            leaf.set_right_sib(right_pid);
        }
        self.bpm.unpin_page(&self.file, pid, true)?;

        if new_key_left {
            self.insert_into_leaf(pid, key, rid, path)?;
        } else {
            self.insert_into_leaf(right_pid, key, rid, path)?;
        }

        let push_up = {
            let page = self.bpm.read_page(&self.file, right_pid)?;
            LeafNode::new(page).key_at(0)
        };
        self.bpm.unpin_page(&self.file, right_pid, false)?;

        match path.pop() {
            None => self.new_root_after_leaf_split(pid, push_up, right_pid)?,
            Some(parent) => self.insert_into_node(parent, push_up, right_pid, path)?,
        }

        Ok(())
    }

    fn new_root_after_leaf_split(&mut self, left: PageId, key: i32, right: PageId) -> Result<()> {
        let (new_root_id, new_root_page) = self.bpm.alloc_page(&self.file)?;
        NonLeafNode::new(new_root_page).init_with_pair(1, left, key, right);
        self.bpm.unpin_page(&self.file, new_root_id, true)?;

        self.root_page_num = new_root_id;
        self.is_root_leaf = false;
        Ok(())
    }

    fn insert_into_node(
        &mut self,
        pid: PageId,
        key: i32,
        right_child: PageId,
        path: &mut Vec<PageId>,
    ) -> Result<()> {
        let full = {
            let page = self.bpm.read_page(&self.file, pid)?;
            let mut node = NonLeafNode::new(page);
            let full = node.is_full();
            if !full {
                node.insert_sorted(key, right_child);
            }
            full
        };

        if full {
            self.bpm.unpin_page(&self.file, pid, false)?;
            self.split_node(pid, key, right_child, path)
        } else {
            self.bpm.unpin_page(&self.file, pid, true)?;
            Ok(())
        }
    }

    /// Splits a full non-leaf node. The new node first receives a raw,
    /// pre-shift copy of the overflow range — its own first key is the value
    /// about to be pushed up, still paired with that key's original left
    /// child — then `drop_first_key` removes that key once its value has
    /// been read, completing the shift.
    fn split_node(
        &mut self,
        pid: PageId,
        key: i32,
        right_child: PageId,
        path: &mut Vec<PageId>,
    ) -> Result<()> {
        const M: usize = NODE_OCCUPANCY;

        let (thresh, new_key_left, level, moved_keys, moved_children): (
            usize,
            bool,
            u32,
            Vec<i32>,
            Vec<PageId>,
        ) = {
            let page = self.bpm.read_page(&self.file, pid)?;
            let node = NonLeafNode::new(page);
            let n = node.entries();
            let (thresh, new_key_left) = if node.key_at(M / 2 - 1) > key {
                (M / 2 - 1, true)
            } else {
                (M / 2, false)
            };
            let moved_keys = (thresh..n).map(|i| node.key_at(i)).collect();
            let moved_children = (thresh..=n).map(|i| node.child_at(i)).collect();
            (thresh, new_key_left, node.level(), moved_keys, moved_children)
        };
        self.bpm.unpin_page(&self.file, pid, false)?;

        let (new_pid, new_page) = self.bpm.alloc_page(&self.file)?;
        NonLeafNode::new(new_page).install_raw(level, &moved_keys, &moved_children);
        self.bpm.unpin_page(&self.file, new_pid, true)?;

        {
            let page = self.bpm.read_page(&self.file, pid)?;
            NonLeafNode::new(page).truncate(thresh);
        }
        self.bpm.unpin_page(&self.file, pid, true)?;

        if new_key_left {
            self.insert_into_node(pid, key, right_child, path)?;
        } else {
            self.insert_into_node(new_pid, key, right_child, path)?;
        }

        let push_up = {
            let page = self.bpm.read_page(&self.file, new_pid)?;
            let mut new_node = NonLeafNode::new(page);
            let push_up = new_node.key_at(0);
            new_node.drop_first_key();
            push_up
        };
        self.bpm.unpin_page(&self.file, new_pid, true)?;

        match path.pop() {
            None => self.new_root_after_node_split(pid, push_up, new_pid)?,
            Some(parent) => self.insert_into_node(parent, push_up, new_pid, path)?,
        }

        Ok(())
    }

    fn new_root_after_node_split(&mut self, left: PageId, key: i32, right: PageId) -> Result<()> {
        let (new_root_id, new_root_page) = self.bpm.alloc_page(&self.file)?;
        NonLeafNode::new(new_root_page).init_with_pair(0, left, key, right);
        self.bpm.unpin_page(&self.file, new_root_id, true)?;

        self.root_page_num = new_root_id;
        Ok(())
    }

    /// Opens a range scan over `(low_val, low_op) .. (high_val, high_op)`,
    /// pinning the first qualifying leaf for `scan_next` to consume.
    pub fn start_scan(
        &mut self,
        low_val: i32,
        low_op: Operator,
        high_val: i32,
        high_op: Operator,
    ) -> Result<()> {
        if !low_op.is_low() || !high_op.is_high() {
            return Err(Error::BadOpcodes.into());
        }
        if low_val > high_val {
            return Err(Error::BadScanrange.into());
        }
        if self.scan.is_some() {
            self.end_scan()?;
        }

        let start_leaf = if self.is_root_leaf {
            self.root_page_num
        } else {
            self.search_key(self.root_page_num, low_val)?
        };

        // Two-leaf lookahead: the low bound may fall in a gap at the end of
        // one leaf, with the first qualifying entry actually at the start of
        // its right sibling.
        let mut current = start_leaf;
        let mut qualifying: Option<(usize, i32)> = None;

        for attempt in 0..2 {
            let (found, right_sib) = {
                let page = self.bpm.read_page(&self.file, current)?;
                let leaf = LeafNode::new(page);
                let n = leaf.entries();
                let mut found = None;
                for i in 0..n {
                    let k = leaf.key_at(i);
                    let satisfies_low = match low_op {
                        Operator::Gte => k >= low_val,
                        Operator::Gt => k > low_val,
                        _ => unreachable!("start_scan validated low_op above"),
                    };
                    if satisfies_low {
                        found = Some((i, k));
                        break;
                    }
                }
                (found, leaf.right_sib())
            };

            if found.is_some() {
                qualifying = found;
                break;
            }

            if attempt == 1 || right_sib == INVALID_PAGE_ID {
                self.bpm.unpin_page(&self.file, current, false)?;
                return Err(Error::NoSuchKeyFound.into());
            }

            self.bpm.unpin_page(&self.file, current, false)?;
            current = right_sib;
        }

        let (entry_index, entry_key) = qualifying.expect("loop above returns on every other path");

        let violates_high =
            entry_key > high_val || (entry_key == high_val && high_op == Operator::Lt);
        if violates_high {
            self.bpm.unpin_page(&self.file, current, false)?;
            return Err(Error::NoSuchKeyFound.into());
        }

        self.scan = Some(ScanState {
            low_op,
            high_op,
            low_val,
            high_val,
            current_page_num: current,
            next_entry: entry_index as isize,
        });
        Ok(())
    }

    /// Returns the next qualifying `RecordId`, transferring the held pin to
    /// the right sibling when the current leaf is exhausted. The currently
    /// pinned leaf is peeked (pin, read, unpin) rather than re-pinned, so the
    /// single persistent pin a scan holds never grows.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let (current_page_num, idx, high_val, high_op) = match &self.scan {
            None => return Err(Error::ScanNotInitialized.into()),
            Some(scan) => {
                if scan.next_entry < 0 {
                    return Err(Error::IndexScanCompleted.into());
                }
                (
                    scan.current_page_num,
                    scan.next_entry as usize,
                    scan.high_val,
                    scan.high_op,
                )
            }
        };

        let (key, rid, entries, right_sib) = {
            let page = self.bpm.read_page(&self.file, current_page_num)?;
            let leaf = LeafNode::new(page);
            (leaf.key_at(idx), leaf.rid_at(idx), leaf.entries(), leaf.right_sib())
        };
        self.bpm.unpin_page(&self.file, current_page_num, false)?; // cancels the peek pin above

        let violates_high = key > high_val || (key == high_val && high_op == Operator::Lt);
        if violates_high {
            self.bpm.unpin_page(&self.file, current_page_num, false)?; // releases the held pin
            if let Some(scan) = self.scan.as_mut() {
                scan.next_entry = -1;
                scan.current_page_num = INVALID_PAGE_ID;
            }
            return Err(Error::IndexScanCompleted.into());
        }

        let next_idx = idx + 1;
        if next_idx < entries {
            if let Some(scan) = self.scan.as_mut() {
                scan.next_entry = next_idx as isize;
            }
        } else if right_sib != INVALID_PAGE_ID {
            self.bpm.read_page(&self.file, right_sib)?; // new held pin
            self.bpm.unpin_page(&self.file, current_page_num, false)?; // releases the old one
            if let Some(scan) = self.scan.as_mut() {
                scan.current_page_num = right_sib;
                scan.next_entry = 0;
            }
        } else {
            self.bpm.unpin_page(&self.file, current_page_num, false)?; // releases the held pin
            if let Some(scan) = self.scan.as_mut() {
                scan.next_entry = -1;
                scan.current_page_num = INVALID_PAGE_ID;
            }
        }

        Ok(rid)
    }

    /// Ends the active scan, releasing whichever leaf is still pinned.
    /// `scan_next` already releases the pin once a scan is exhausted, so a
    /// stray `PageNotPinned` here is expected, not an error.
    pub fn end_scan(&mut self) -> Result<()> {
        let scan = self.scan.take().ok_or(Error::ScanNotInitialized)?;
        if scan.current_page_num != INVALID_PAGE_ID {
            match self.bpm.unpin_page(&self.file, scan.current_page_num, false) {
                Ok(()) => {}
                Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::PageNotPinned { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if self.scan.is_some() {
            let _ = self.end_scan();
        }
        if let Err(e) = self.bpm.flush_file(&self.file) {
            printdbg!("error flushing index file on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::test_dir;

    fn record(key: i32) -> Vec<u8> {
        let mut bytes = vec![0u8; 16];
        bytes[4..8].copy_from_slice(&key.to_ne_bytes());
        bytes
    }

    fn build_index(dir: &Path, keys: impl Iterator<Item = i32>, frames: usize) -> Result<BTreeIndex> {
        let relation_dir = dir.join("relation");
        let records: Vec<Vec<u8>> = keys.map(record).collect();
        let relation = RelationFile::build(&relation_dir, 16, &records)?;
        BTreeIndex::build(dir, "relation", 4, AttrType::Integer, frames, &relation)
    }

    #[test]
    fn scans_a_small_sequential_range() -> Result<()> {
        let dir = test_dir();
        let mut index = build_index(&dir, 0..20, 16)?;

        index.start_scan(5, Operator::Gte, 10, Operator::Lte)?;
        let mut found = Vec::new();
        loop {
            match index.scan_next() {
                Ok(rid) => found.push(rid),
                Err(e) => {
                    assert!(matches!(
                        e.downcast_ref::<Error>(),
                        Some(Error::IndexScanCompleted)
                    ));
                    break;
                }
            }
        }
        index.end_scan()?;

        assert_eq!(found.len(), 6); // 5,6,7,8,9,10

        drop(index);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn sequential_insert_forces_many_splits_and_scans_correctly() -> Result<()> {
        let dir = test_dir();
        let mut index = build_index(&dir, 0..2000, 32)?;

        index.start_scan(100, Operator::Gte, 1899, Operator::Lte)?;
        let mut count = 0;
        loop {
            match index.scan_next() {
                Ok(_) => count += 1,
                Err(_) => break,
            }
        }
        index.end_scan()?;

        assert_eq!(count, 1800);

        drop(index);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn scan_with_bad_operators_fails() -> Result<()> {
        let dir = test_dir();
        let mut index = build_index(&dir, 0..10, 16)?;

        let err = index
            .start_scan(1, Operator::Lt, 5, Operator::Lte)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::BadOpcodes)
        ));

        drop(index);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn scan_with_inverted_range_fails() -> Result<()> {
        let dir = test_dir();
        let mut index = build_index(&dir, 0..10, 16)?;

        let err = index
            .start_scan(5, Operator::Gte, 1, Operator::Lte)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::BadScanrange)
        ));

        drop(index);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn reopen_with_mismatched_attr_offset_fails() -> Result<()> {
        let dir = test_dir();
        let index = build_index(&dir, 0..10, 16)?;
        drop(index);

        let err = BTreeIndex::open(&dir, "relation", 8, AttrType::Integer, 16).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::BadIndexInfo)
        ));

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn reopen_restores_root_and_scans_correctly() -> Result<()> {
        let dir = test_dir();
        let index = build_index(&dir, 0..500, 16)?;
        drop(index);

        let mut reopened = BTreeIndex::open(&dir, "relation", 4, AttrType::Integer, 16)?;
        reopened.start_scan(0, Operator::Gte, 499, Operator::Lte)?;
        let mut count = 0;
        while reopened.scan_next().is_ok() {
            count += 1;
        }
        reopened.end_scan()?;

        assert_eq!(count, 500);

        drop(reopened);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn insert_entry_directly_without_relation_build() -> Result<()> {
        let dir = test_dir();
        let relation_dir = dir.join("relation");
        let relation = RelationFile::build(&relation_dir, 16, &[])?;
        let mut index = BTreeIndex::build(&dir, "relation", 4, AttrType::Integer, 16, &relation)?;

        for key in (0..50).rev() {
            index.insert_entry(key, RecordId::new(1, key as u32))?;
        }

        index.start_scan(0, Operator::Gte, 49, Operator::Lte)?;
        let mut count = 0;
        while index.scan_next().is_ok() {
            count += 1;
        }
        index.end_scan()?;
        assert_eq!(count, 50);

        drop(index);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
