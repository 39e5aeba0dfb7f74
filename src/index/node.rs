//! On-disk layouts for the index metadata page, leaf nodes, and non-leaf
//! nodes. Each is a thin view over a pinned [`Page`]'s raw bytes, addressed
//! through `Page::read_*`/`write_*` helpers rather than an unsafe pointer
//! cast, so the fixed-capacity key/child arrays don't depend on any
//! particular in-memory layout of a generic container.

use crate::page::{Page, PageId, INVALID_PAGE_ID};
use crate::record_id::{RecordId, RECORD_ID_SIZE};

/// Maximum entries in a leaf: chosen so a leaf record fits in one page.
pub const LEAF_OCCUPANCY: usize = 340;
/// Maximum entries in a non-leaf node: chosen so a non-leaf record fits in
/// one page (`NODE_OCCUPANCY` keys, `NODE_OCCUPANCY + 1` children).
pub const NODE_OCCUPANCY: usize = 510;

const LEAF_ENTRIES_OFFSET: usize = 0;
const LEAF_RIGHT_SIB_OFFSET: usize = 4;
const LEAF_KEYS_OFFSET: usize = 8;
const LEAF_RIDS_OFFSET: usize = LEAF_KEYS_OFFSET + 4 * LEAF_OCCUPANCY;

const NODE_ENTRIES_OFFSET: usize = 0;
const NODE_LEVEL_OFFSET: usize = 4;
const NODE_KEYS_OFFSET: usize = 8;
const NODE_CHILDREN_OFFSET: usize = NODE_KEYS_OFFSET + 4 * NODE_OCCUPANCY;

const META_NAME_LEN: usize = 48;
const META_NAME_OFFSET: usize = 0;
const META_ATTR_OFFSET_OFFSET: usize = META_NAME_OFFSET + META_NAME_LEN;
const META_ATTR_TYPE_OFFSET: usize = META_ATTR_OFFSET_OFFSET + 4;
const META_ROOT_PAGE_NUM_OFFSET: usize = META_ATTR_TYPE_OFFSET + 4;
const META_IS_ROOT_LEAF_OFFSET: usize = META_ROOT_PAGE_NUM_OFFSET + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Integer,
}

impl AttrType {
    fn to_u32(self) -> u32 {
        match self {
            AttrType::Integer => 0,
        }
    }

    fn from_u32(value: u32) -> Self {
        match value {
            0 => AttrType::Integer,
            other => panic!("unknown attribute type tag {other}"),
        }
    }
}

/// Page 1 of every index file.
pub struct MetadataPage<'a> {
    page: &'a mut Page,
}

impl<'a> MetadataPage<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    pub fn write(
        &mut self,
        relation_name: &str,
        attr_offset: u32,
        attr_type: AttrType,
        root_page_num: PageId,
        is_root_leaf: bool,
    ) {
        let mut name_bytes = [0u8; META_NAME_LEN];
        let raw = relation_name.as_bytes();
        let len = raw.len().min(META_NAME_LEN - 1);
        name_bytes[..len].copy_from_slice(&raw[..len]);
        self.page
            .write_bytes(META_NAME_OFFSET, META_NAME_OFFSET + META_NAME_LEN, &name_bytes);
        self.page.write_u32(META_ATTR_OFFSET_OFFSET, attr_offset);
        self.page.write_u32(META_ATTR_TYPE_OFFSET, attr_type.to_u32());
        self.page.write_u32(META_ROOT_PAGE_NUM_OFFSET, root_page_num);
        self.page
            .write_u32(META_IS_ROOT_LEAF_OFFSET, u32::from(is_root_leaf));
    }

    pub fn relation_name(&self) -> String {
        let bytes = self
            .page
            .read_bytes(META_NAME_OFFSET, META_NAME_OFFSET + META_NAME_LEN);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    pub fn attr_offset(&self) -> u32 {
        self.page.read_u32(META_ATTR_OFFSET_OFFSET)
    }

    pub fn attr_type(&self) -> AttrType {
        AttrType::from_u32(self.page.read_u32(META_ATTR_TYPE_OFFSET))
    }

    pub fn root_page_num(&self) -> PageId {
        self.page.read_u32(META_ROOT_PAGE_NUM_OFFSET)
    }

    pub fn is_root_leaf(&self) -> bool {
        self.page.read_u32(META_IS_ROOT_LEAF_OFFSET) != 0
    }
}

/// A leaf node: entry count, parallel ascending `keys`/`rids` arrays, and a
/// right-sibling pointer.
pub struct LeafNode<'a> {
    page: &'a mut Page,
}

impl<'a> LeafNode<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    pub fn init_empty(&mut self) {
        self.set_entries(0);
        self.set_right_sib(INVALID_PAGE_ID);
    }

    pub fn entries(&self) -> usize {
        self.page.read_u32(LEAF_ENTRIES_OFFSET) as usize
    }

    fn set_entries(&mut self, n: usize) {
        self.page.write_u32(LEAF_ENTRIES_OFFSET, n as u32);
    }

    pub fn right_sib(&self) -> PageId {
        self.page.read_u32(LEAF_RIGHT_SIB_OFFSET)
    }

    pub fn set_right_sib(&mut self, page_no: PageId) {
        self.page.write_u32(LEAF_RIGHT_SIB_OFFSET, page_no);
    }

    pub fn key_at(&self, i: usize) -> i32 {
        self.page.read_i32(LEAF_KEYS_OFFSET + 4 * i)
    }

    fn set_key_at(&mut self, i: usize, key: i32) {
        self.page.write_i32(LEAF_KEYS_OFFSET + 4 * i, key);
    }

    pub fn rid_at(&self, i: usize) -> RecordId {
        let start = LEAF_RIDS_OFFSET + RECORD_ID_SIZE * i;
        RecordId::from_bytes(self.page.read_bytes(start, start + RECORD_ID_SIZE))
    }

    fn set_rid_at(&mut self, i: usize, rid: RecordId) {
        let start = LEAF_RIDS_OFFSET + RECORD_ID_SIZE * i;
        self.page
            .write_bytes(start, start + RECORD_ID_SIZE, &rid.to_bytes());
    }

    pub fn is_full(&self) -> bool {
        self.entries() == LEAF_OCCUPANCY
    }

    /// Locates the first key strictly greater than `key` by linear scan.
    /// Ties place a new entry after existing equal keys, matching how
    /// non-leaf descent routes an exact match to the right child.
    fn insertion_index(&self, key: i32) -> usize {
        let n = self.entries();
        let mut i = 0;
        while i < n && self.key_at(i) <= key {
            i += 1;
        }
        i
    }

    /// In-place insertion path: caller must have already checked `!is_full()`.
    pub fn insert_sorted(&mut self, key: i32, rid: RecordId) {
        let n = self.entries();
        debug_assert!(n < LEAF_OCCUPANCY);
        let at = self.insertion_index(key);

        for j in (at..n).rev() {
            let k = self.key_at(j);
            let r = self.rid_at(j);
            self.set_key_at(j + 1, k);
            self.set_rid_at(j + 1, r);
        }

        self.set_key_at(at, key);
        self.set_rid_at(at, rid);
        self.set_entries(n + 1);
    }

    /// Drops the entries from `n` onward after their contents have already
    /// been copied elsewhere during a split.
    pub fn truncate(&mut self, n: usize) {
        self.set_entries(n);
    }
}

/// A non-leaf node: entry count, `n` ascending keys, `n+1` child pointers,
/// and a `level` flag (`1` => children are leaves).
pub struct NonLeafNode<'a> {
    page: &'a mut Page,
}

impl<'a> NonLeafNode<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    pub fn init_with_pair(&mut self, level: u32, left: PageId, key: i32, right: PageId) {
        self.set_level(level);
        self.set_child_at(0, left);
        self.set_key_at(0, key);
        self.set_child_at(1, right);
        self.set_entries(1);
    }

    pub fn entries(&self) -> usize {
        self.page.read_u32(NODE_ENTRIES_OFFSET) as usize
    }

    fn set_entries(&mut self, n: usize) {
        self.page.write_u32(NODE_ENTRIES_OFFSET, n as u32);
    }

    pub fn level(&self) -> u32 {
        self.page.read_u32(NODE_LEVEL_OFFSET)
    }

    fn set_level(&mut self, level: u32) {
        self.page.write_u32(NODE_LEVEL_OFFSET, level);
    }

    pub fn key_at(&self, i: usize) -> i32 {
        self.page.read_i32(NODE_KEYS_OFFSET + 4 * i)
    }

    fn set_key_at(&mut self, i: usize, key: i32) {
        self.page.write_i32(NODE_KEYS_OFFSET + 4 * i, key);
    }

    pub fn child_at(&self, i: usize) -> PageId {
        self.page.read_u32(NODE_CHILDREN_OFFSET + 4 * i)
    }

    fn set_child_at(&mut self, i: usize, page_no: PageId) {
        self.page.write_u32(NODE_CHILDREN_OFFSET + 4 * i, page_no);
    }

    pub fn is_full(&self) -> bool {
        self.entries() == NODE_OCCUPANCY
    }

    /// Descent routing rule: the first key strictly greater than `key` routes
    /// left into that slot's child; ties and anything larger than every key
    /// route to the rightmost child.
    pub fn find_child(&self, key: i32) -> PageId {
        let n = self.entries();
        for i in 0..n {
            if key < self.key_at(i) {
                return self.child_at(i);
            }
        }
        self.child_at(n)
    }

    fn insertion_index(&self, key: i32) -> usize {
        let n = self.entries();
        let mut i = 0;
        while i < n && self.key_at(i) <= key {
            i += 1;
        }
        i
    }

    /// In-place insertion path: caller must have already checked `!is_full()`.
    pub fn insert_sorted(&mut self, key: i32, right_child: PageId) {
        let n = self.entries();
        debug_assert!(n < NODE_OCCUPANCY);
        let at = self.insertion_index(key);

        for j in (at..n).rev() {
            let k = self.key_at(j);
            self.set_key_at(j + 1, k);
        }
        for j in ((at + 1)..=n).rev() {
            let c = self.child_at(j);
            self.set_child_at(j + 1, c);
        }

        self.set_key_at(at, key);
        self.set_child_at(at + 1, right_child);
        self.set_entries(n + 1);
    }

    /// Installs a raw, pre-shift copy of a sibling's overflow range during a
    /// node split: `children.len()` must be `keys.len() + 1`. The resulting
    /// node's first key is the one destined to be pushed up, still paired
    /// with its original left child (`drop_first_key` removes it).
    pub fn install_raw(&mut self, level: u32, keys: &[i32], children: &[PageId]) {
        debug_assert_eq!(children.len(), keys.len() + 1);
        self.set_level(level);
        for (i, key) in keys.iter().enumerate() {
            self.set_key_at(i, *key);
        }
        for (i, child) in children.iter().enumerate() {
            self.set_child_at(i, *child);
        }
        self.set_entries(keys.len());
    }

    /// Drops entries from `n` onward after their contents have already been
    /// copied elsewhere during a split.
    pub fn truncate(&mut self, n: usize) {
        self.set_entries(n);
    }

    /// Shifts keys and children one slot left, discarding the first key
    /// (and its now-stale left child pointer) once it has been read off as
    /// the value to push up into the parent.
    pub fn drop_first_key(&mut self) {
        let n = self.entries();
        debug_assert!(n > 0);
        for i in 0..n - 1 {
            let key = self.key_at(i + 1);
            self.set_key_at(i, key);
        }
        for i in 0..n {
            let child = self.child_at(i + 1);
            self.set_child_at(i, child);
        }
        self.set_entries(n - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;

    #[test]
    fn leaf_insert_keeps_sorted_order() {
        let mut page = Page::new();
        let mut leaf = LeafNode::new(&mut page);
        leaf.init_empty();

        for key in [5, 3, 8, 1, 3] {
            leaf.insert_sorted(key, RecordId::new(1, key as u32));
        }

        let keys: Vec<i32> = (0..leaf.entries()).map(|i| leaf.key_at(i)).collect();
        assert_eq!(keys, vec![1, 3, 3, 5, 8]);
    }

    #[test]
    fn leaf_duplicate_appends_after_existing_equal() {
        let mut page = Page::new();
        let mut leaf = LeafNode::new(&mut page);
        leaf.init_empty();

        leaf.insert_sorted(4, RecordId::new(1, 0));
        leaf.insert_sorted(4, RecordId::new(1, 1));

        assert_eq!(leaf.rid_at(0).slot_no, 0);
        assert_eq!(leaf.rid_at(1).slot_no, 1);
    }

    #[test]
    fn non_leaf_find_child_routes_equals_right() {
        let mut page = Page::new();
        let mut node = NonLeafNode::new(&mut page);
        node.init_with_pair(1, 10, 50, 20);

        assert_eq!(node.find_child(49), 10);
        assert_eq!(node.find_child(50), 20);
        assert_eq!(node.find_child(51), 20);
    }

    #[test]
    fn non_leaf_insert_shifts_keys_and_children() {
        let mut page = Page::new();
        let mut node = NonLeafNode::new(&mut page);
        node.init_with_pair(1, 10, 50, 20);
        node.insert_sorted(30, 99);

        assert_eq!(node.entries(), 2);
        assert_eq!(node.key_at(0), 30);
        assert_eq!(node.key_at(1), 50);
        assert_eq!(node.child_at(0), 10);
        assert_eq!(node.child_at(1), 99);
        assert_eq!(node.child_at(2), 20);
    }

    #[test]
    fn metadata_round_trips() {
        let mut page = Page::new();
        {
            let mut meta = MetadataPage::new(&mut page);
            meta.write("relation", 8, AttrType::Integer, 3, true);
        }
        let meta = MetadataPage::new(&mut page);
        assert_eq!(meta.relation_name(), "relation");
        assert_eq!(meta.attr_offset(), 8);
        assert_eq!(meta.attr_type(), AttrType::Integer);
        assert_eq!(meta.root_page_num(), 3);
        assert!(meta.is_root_leaf());
    }
}
