//! The relation scanner: iterates fixed-width binary records packed into
//! pages of the same [`PagedFile`] the index itself uses, and extracts one
//! `i32` key per record at a configured byte offset, so index construction
//! has something concrete to scan.

use crate::disk::PagedFile;
use crate::page::{Page, PageId};
use crate::record_id::RecordId;
use anyhow::Result;
use std::path::Path;

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_START: usize = 4;

/// A flat relation file: each page starts with a 4-byte record count,
/// followed by that many fixed-size records packed contiguously.
pub struct RelationFile {
    file: PagedFile,
    record_size: usize,
}

impl RelationFile {
    pub fn open(dir: &Path, record_size: usize) -> Result<Self> {
        Ok(Self {
            file: PagedFile::open(dir)?,
            record_size,
        })
    }

    /// Test/tooling helper: builds a relation file from raw record bytes,
    /// packing as many as fit per page.
    pub fn build(dir: &Path, record_size: usize, records: &[Vec<u8>]) -> Result<Self> {
        let file = PagedFile::create(dir)?;
        let per_page = (crate::page::PAGE_SIZE - RECORDS_START) / record_size;
        assert!(per_page > 0, "record_size too large for a single page");

        for chunk in records.chunks(per_page.max(1)) {
            let (page_no, mut page) = file.allocate_page()?;
            page.write_u32(RECORD_COUNT_OFFSET, chunk.len() as u32);
            for (slot, record) in chunk.iter().enumerate() {
                assert_eq!(record.len(), record_size);
                let start = RECORDS_START + slot * record_size;
                page.write_bytes(start, start + record_size, record);
            }
            file.write_page(page_no, &page)?;
        }

        Ok(Self { file, record_size })
    }

    pub fn scan(&self, key_offset: usize) -> Result<RelationScanner<'_>> {
        Ok(RelationScanner {
            relation: self,
            key_offset,
            page_ids: self.file.page_ids()?,
            page_index: 0,
            current_page: None,
            slot: 0,
            record_count: 0,
        })
    }
}

/// Yields `(RecordId, key)` pairs across the whole relation file in page,
/// then slot, order. End of input surfaces internally as `Error::EndOfFile`
/// — translated here into `Iterator::None`, the idiomatic Rust shape for
/// the spec's "EndOfFile caught, not surfaced" rule.
pub struct RelationScanner<'a> {
    relation: &'a RelationFile,
    key_offset: usize,
    page_ids: Vec<PageId>,
    page_index: usize,
    current_page: Option<Page>,
    slot: usize,
    record_count: usize,
}

impl Iterator for RelationScanner<'_> {
    type Item = Result<(RecordId, i32)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_page.is_none() {
                if self.page_index >= self.page_ids.len() {
                    return None; // Error::EndOfFile, handled internally.
                }
                let page_no = self.page_ids[self.page_index];
                let page = match self.relation.file.read_page(page_no) {
                    Ok(page) => page,
                    Err(e) => return Some(Err(e)),
                };
                self.record_count = page.read_u32(RECORD_COUNT_OFFSET) as usize;
                self.current_page = Some(page);
                self.slot = 0;
            }

            let page_no = self.page_ids[self.page_index];
            if self.slot >= self.record_count {
                self.current_page = None;
                self.page_index += 1;
                continue;
            }

            let page = self.current_page.as_ref().unwrap();
            let record_start = RECORDS_START + self.slot * self.relation.record_size;
            let key_start = record_start + self.key_offset;
            let key = page.read_i32(key_start);
            let rid = RecordId::new(page_no, self.slot as u32);
            self.slot += 1;

            return Some(Ok((rid, key)));
        }
    }
}
