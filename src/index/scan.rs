//! Range-scan operator enum and in-flight scan state.

use crate::page::PageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    pub fn is_low(self) -> bool {
        matches!(self, Operator::Gt | Operator::Gte)
    }

    pub fn is_high(self) -> bool {
        matches!(self, Operator::Lt | Operator::Lte)
    }
}

/// A scan holds exactly one leaf pinned between `start_scan` and `end_scan`,
/// transferring the pin rightward via the sibling chain as it advances.
pub struct ScanState {
    pub low_op: Operator,
    pub high_op: Operator,
    pub low_val: i32,
    pub high_val: i32,
    pub current_page_num: PageId,
    /// `-1` once the scan is exhausted.
    pub next_entry: isize,
}
