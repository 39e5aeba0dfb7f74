//! Record identifiers: opaque-to-the-index pointers into the external
//! relation file. A `RecordId` is two 4-byte integers, a page number and a
//! slot number within that page.

pub const RECORD_ID_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_no: u32,
    pub slot_no: u32,
}

impl RecordId {
    pub fn new(page_no: u32, slot_no: u32) -> Self {
        Self { page_no, slot_no }
    }

    pub fn to_bytes(self) -> [u8; RECORD_ID_SIZE] {
        let mut bytes = [0u8; RECORD_ID_SIZE];
        bytes[0..4].copy_from_slice(&self.page_no.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.slot_no.to_ne_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), RECORD_ID_SIZE);
        Self {
            page_no: u32::from_ne_bytes(bytes[0..4].try_into().unwrap()),
            slot_no: u32::from_ne_bytes(bytes[4..8].try_into().unwrap()),
        }
    }
}
