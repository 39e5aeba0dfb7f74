//! Frame descriptors: one slot in the buffer pool, holding at most one page
//! at a time.

use crate::disk::PagedFile;
use crate::page::{Page, PageId, INVALID_PAGE_ID};
use std::rc::Rc;

pub(super) struct FrameDescriptor {
    pub valid: bool,
    pub file: Option<Rc<PagedFile>>,
    pub page_no: PageId,
    pub pin_cnt: u32,
    pub dirty: bool,
    pub refbit: bool,
    pub buffer: Page,
}

impl FrameDescriptor {
    pub fn empty() -> Self {
        Self {
            valid: false,
            file: None,
            page_no: INVALID_PAGE_ID,
            pin_cnt: 0,
            dirty: false,
            refbit: false,
            buffer: Page::new(),
        }
    }

    /// `valid = false` means every other field is meaningless and the frame
    /// is freely available.
    pub fn clear(&mut self) {
        self.valid = false;
        self.file = None;
        self.page_no = INVALID_PAGE_ID;
        self.pin_cnt = 0;
        self.dirty = false;
        self.refbit = false;
    }

    /// File-identity check used by `flush_file`, independent of `valid` so
    /// that an invalid-but-still-owned frame can be reported as
    /// [`crate::errors::Error::BadBuffer`] instead of silently skipped.
    pub fn owned_by(&self, file: &Rc<PagedFile>) -> bool {
        self.file.as_ref().is_some_and(|owner| Rc::ptr_eq(owner, file))
    }
}
