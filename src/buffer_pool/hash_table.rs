//! The buffer pool's own hash table mapping `(file, page_no) -> FrameId`.
//! Implemented as a dedicated open-chaining table rather than a bare
//! `std::collections::HashMap`, sized at approximately `1.2 x numFrames`
//! rounded to an odd number — this table is part of the design being
//! specified, not an implementation detail to hide behind a generic map.

use crate::disk::PagedFile;
use crate::errors::Error;
use crate::page::PageId;
use anyhow::Result;
use std::rc::Rc;

type FrameId = usize;

/// Two clones of the same `Rc<PagedFile>` are the same file; two handles
/// opened separately for the same path are not — file identity is resolved
/// as pointer identity, not path equality.
fn file_key(file: &Rc<PagedFile>) -> usize {
    Rc::as_ptr(file) as usize
}

fn bucket_size(num_frames: usize) -> usize {
    let raw = ((num_frames as f64) * 1.2) as usize;
    let odd = raw | 1;
    odd.max(1)
}

pub(super) struct BufHashTable {
    buckets: Vec<Vec<(usize, PageId, FrameId)>>,
}

impl BufHashTable {
    pub fn new(num_frames: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); bucket_size(num_frames)],
        }
    }

    fn bucket_for(&self, key: usize, page_no: PageId) -> usize {
        let mixed = key ^ (page_no as usize).wrapping_mul(0x9E37_79B9);
        mixed % self.buckets.len()
    }

    pub fn lookup(&self, file: &Rc<PagedFile>, page_no: PageId) -> Result<FrameId> {
        let key = file_key(file);
        let bucket = &self.buckets[self.bucket_for(key, page_no)];
        bucket
            .iter()
            .find(|(f, p, _)| *f == key && *p == page_no)
            .map(|(_, _, frame_id)| *frame_id)
            .ok_or_else(|| Error::HashNotFound.into())
    }

    pub fn insert(&mut self, file: &Rc<PagedFile>, page_no: PageId, frame_id: FrameId) {
        let key = file_key(file);
        let idx = self.bucket_for(key, page_no);
        debug_assert!(!self.buckets[idx]
            .iter()
            .any(|(f, p, _)| *f == key && *p == page_no));
        self.buckets[idx].push((key, page_no, frame_id));
    }

    pub fn remove(&mut self, file: &Rc<PagedFile>, page_no: PageId) {
        let key = file_key(file);
        let idx = self.bucket_for(key, page_no);
        self.buckets[idx].retain(|(f, p, _)| !(*f == key && *p == page_no));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::test_dir;

    #[test]
    fn insert_then_lookup_hits() -> Result<()> {
        let dir = test_dir();
        let file = Rc::new(PagedFile::create(&dir)?);
        let mut table = BufHashTable::new(8);

        table.insert(&file, 5, 2);
        assert_eq!(table.lookup(&file, 5)?, 2);

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn miss_raises_hash_not_found() -> Result<()> {
        let dir = test_dir();
        let file = Rc::new(PagedFile::create(&dir)?);
        let table = BufHashTable::new(8);

        let err = table.lookup(&file, 1).unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some());

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn distinct_handles_to_same_path_are_distinct_files() -> Result<()> {
        let dir = test_dir();
        let file_a = Rc::new(PagedFile::create(&dir)?);
        let file_b = Rc::new(PagedFile::open(&dir)?);
        let mut table = BufHashTable::new(8);

        table.insert(&file_a, 1, 0);
        assert!(table.lookup(&file_b, 1).is_err());

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn remove_clears_entry() -> Result<()> {
        let dir = test_dir();
        let file = Rc::new(PagedFile::create(&dir)?);
        let mut table = BufHashTable::new(8);

        table.insert(&file, 3, 1);
        table.remove(&file, 3);
        assert!(table.lookup(&file, 3).is_err());

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
