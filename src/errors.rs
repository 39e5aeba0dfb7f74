//! Error kinds for the buffer pool and B+-tree index.
//!
//! A single hand-written `Error` enum with a `Display` impl, surfaced
//! through `anyhow::Result` everywhere instead of a dedicated
//! error-handling crate.

use crate::page::PageId;

#[derive(Debug)]
pub enum Error {
    /// `(file, page_no)` not currently buffered. Always caught internally by
    /// the buffer pool; never surfaced to a caller.
    HashNotFound,
    /// Every frame is pinned; eviction could not find a candidate after two
    /// full revolutions of the clock hand.
    BufferExceeded,
    /// Caller unpinned a page whose pin count is already zero.
    PageNotPinned { page_no: PageId },
    /// A page belonging to the file being flushed is still pinned.
    PagePinned { page_no: PageId },
    /// Invariant violation: an invalid frame is still referenced while
    /// flushing its owning file.
    BadBuffer { frame_id: usize },
    /// A scan's operator combination is outside `{GT, GTE} x {LT, LTE}`.
    BadOpcodes,
    /// A scan was given a low bound greater than its high bound.
    BadScanrange,
    /// No index entry satisfies the requested scan bounds.
    NoSuchKeyFound,
    /// `scan_next`/`end_scan` called with no active scan.
    ScanNotInitialized,
    /// The active scan has been exhausted.
    IndexScanCompleted,
    /// A pre-existing index file's metadata does not match the requested
    /// relation name, key offset, or attribute type.
    BadIndexInfo,
    /// End of the relation file reached while scanning it for index build.
    /// Strictly internal to the build loop; never surfaced. The relation
    /// scanner expresses this as `Iterator::None` rather than constructing
    /// this variant, so it is kept only for documentation parity with the
    /// rest of the error set.
    #[allow(dead_code)]
    EndOfFile,
    /// Propagated unchanged from the file layer.
    FileNotFound { path: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::HashNotFound => write!(f, "page not found in buffer pool hash table"),
            Error::BufferExceeded => write!(f, "no free frame: all buffer pool frames are pinned"),
            Error::PageNotPinned { page_no } => {
                write!(f, "page {page_no} is not pinned")
            }
            Error::PagePinned { page_no } => {
                write!(f, "page {page_no} is still pinned, cannot flush file")
            }
            Error::BadBuffer { frame_id } => {
                write!(f, "frame {frame_id} is invalid but owned by the flushed file")
            }
            Error::BadOpcodes => write!(f, "scan operators must be (GT|GTE, LT|LTE)"),
            Error::BadScanrange => write!(f, "scan low bound is greater than high bound"),
            Error::NoSuchKeyFound => write!(f, "no entry satisfies the requested scan range"),
            Error::ScanNotInitialized => write!(f, "no scan is currently executing"),
            Error::IndexScanCompleted => write!(f, "scan has been exhausted"),
            Error::BadIndexInfo => {
                write!(f, "existing index metadata does not match requested parameters")
            }
            Error::EndOfFile => write!(f, "end of file"),
            Error::FileNotFound { path } => write!(f, "file not found: {path}"),
        }
    }
}

impl std::error::Error for Error {}
