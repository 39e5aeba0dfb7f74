//! The buffer pool manager: a fixed-capacity page-frame cache with
//! clock-sweep replacement and explicit pin/unpin reference counting.

mod frame;
mod hash_table;

use crate::disk::PagedFile;
use crate::errors::Error;
use crate::page::{Page, PageId};
use crate::printdbg;
use anyhow::Result;
use frame::FrameDescriptor;
use hash_table::BufHashTable;
use std::rc::Rc;

type FrameId = usize;

pub struct BufferPoolManager {
    frames: Vec<FrameDescriptor>,
    hash_table: BufHashTable,
    num_frames: usize,
    /// Initialized to `N - 1` so the first advance lands on frame 0.
    clock_hand: usize,
}

impl BufferPoolManager {
    pub fn new(num_frames: usize) -> Self {
        assert!(num_frames > 0, "buffer pool must have at least one frame");
        Self {
            frames: (0..num_frames).map(|_| FrameDescriptor::empty()).collect(),
            hash_table: BufHashTable::new(num_frames),
            num_frames,
            clock_hand: num_frames - 1,
        }
    }

    /// Pins the page, loading it from disk on a miss.
    pub fn read_page(&mut self, file: &Rc<PagedFile>, page_no: PageId) -> Result<&mut Page> {
        let frame_id = match self.hash_table.lookup(file, page_no) {
            Ok(frame_id) => {
                let frame = &mut self.frames[frame_id];
                frame.refbit = true;
                frame.pin_cnt += 1;
                printdbg!("read_page hit: page {page_no} (frame {frame_id})");
                frame_id
            }
            Err(_) => {
                let frame_id = self.alloc_buf()?;
                let page = file.read_page(page_no)?;
                self.hash_table.insert(file, page_no, frame_id);

                let frame = &mut self.frames[frame_id];
                frame.valid = true;
                frame.file = Some(file.clone());
                frame.page_no = page_no;
                frame.pin_cnt = 1;
                frame.dirty = false;
                frame.refbit = true;
                frame.buffer = page;

                printdbg!("read_page miss: page {page_no} loaded into frame {frame_id}");
                frame_id
            }
        };

        Ok(&mut self.frames[frame_id].buffer)
    }

    /// Asks `file` to allocate a fresh page and pins it.
    pub fn alloc_page(&mut self, file: &Rc<PagedFile>) -> Result<(PageId, &mut Page)> {
        let (page_no, page) = file.allocate_page()?;
        let frame_id = self.alloc_buf()?;
        self.hash_table.insert(file, page_no, frame_id);

        let frame = &mut self.frames[frame_id];
        frame.valid = true;
        frame.file = Some(file.clone());
        frame.page_no = page_no;
        frame.pin_cnt = 1;
        frame.refbit = true;
        frame.dirty = false;
        frame.buffer = page;

        printdbg!("alloc_page: new page {page_no} in frame {frame_id}");
        Ok((page_no, &mut self.frames[frame_id].buffer))
    }

    pub fn unpin_page(&mut self, file: &Rc<PagedFile>, page_no: PageId, dirty: bool) -> Result<()> {
        let frame_id = match self.hash_table.lookup(file, page_no) {
            Ok(frame_id) => frame_id,
            Err(_) => return Ok(()), // not buffered: silent no-op.
        };

        let frame = &mut self.frames[frame_id];
        if frame.pin_cnt == 0 {
            return Err(Error::PageNotPinned { page_no }.into());
        }
        frame.pin_cnt -= 1;
        if dirty {
            frame.dirty = true; // dirty flags are additive; never cleared here.
        }

        printdbg!("unpin_page: page {page_no}, pin count now {}", frame.pin_cnt);
        Ok(())
    }

    /// Writes back every dirty frame belonging to `file` and invalidates them.
    pub fn flush_file(&mut self, file: &Rc<PagedFile>) -> Result<()> {
        for frame_id in 0..self.num_frames {
            if !self.frames[frame_id].owned_by(file) {
                continue;
            }

            if !self.frames[frame_id].valid {
                return Err(Error::BadBuffer { frame_id }.into());
            }
            if self.frames[frame_id].pin_cnt > 0 {
                return Err(Error::PagePinned {
                    page_no: self.frames[frame_id].page_no,
                }
                .into());
            }
            if self.frames[frame_id].dirty {
                let page_no = self.frames[frame_id].page_no;
                file.write_page(page_no, &self.frames[frame_id].buffer)?;
                self.frames[frame_id].dirty = false;
            }

            self.hash_table.remove(file, self.frames[frame_id].page_no);
            self.frames[frame_id].clear();
        }

        printdbg!("flush_file complete");
        Ok(())
    }

    /// Evicts `page_no` from the pool if buffered (discarding any dirty
    /// content) and asks `file` to delete it.
    pub fn dispose_page(&mut self, file: &Rc<PagedFile>, page_no: PageId) -> Result<()> {
        if let Ok(frame_id) = self.hash_table.lookup(file, page_no) {
            self.hash_table.remove(file, page_no);
            self.frames[frame_id].clear();
        }
        file.delete_page(page_no)
    }

    /// Clock-sweep replacement. Runs at most two full revolutions of the
    /// clock hand: the first performs second-chance downgrades, the second
    /// consumes them.
    fn alloc_buf(&mut self) -> Result<FrameId> {
        let start = self.clock_hand;
        let mut revolutions = 0usize;

        loop {
            self.clock_hand = (self.clock_hand + 1) % self.num_frames;
            let hand = self.clock_hand;

            if !self.frames[hand].valid {
                return Ok(hand);
            } else if self.frames[hand].refbit {
                self.frames[hand].refbit = false;
            } else if self.frames[hand].pin_cnt != 0 {
                // unevictable, skip
            } else {
                let file = self.frames[hand].file.clone().unwrap();
                let page_no = self.frames[hand].page_no;

                if self.frames[hand].dirty {
                    file.write_page(page_no, &self.frames[hand].buffer)?;
                }

                self.hash_table.remove(&file, page_no);
                self.frames[hand].clear();
                return Ok(hand);
            }

            if self.clock_hand == start {
                revolutions += 1;
                if revolutions >= 2 {
                    return Err(Error::BufferExceeded.into());
                }
            }
        }
    }

    #[cfg(test)]
    pub fn pin_count(&self, file: &Rc<PagedFile>, page_no: PageId) -> Option<u32> {
        self.hash_table
            .lookup(file, page_no)
            .ok()
            .map(|frame_id| self.frames[frame_id].pin_cnt)
    }

    #[cfg(test)]
    pub fn all_unpinned(&self) -> bool {
        self.frames.iter().all(|f| f.pin_cnt == 0)
    }
}
