//! Concrete end-to-end scenarios exercised against the public crate API
//! rather than any one module's internals.

use crate::buffer_pool::BufferPoolManager;
use crate::disk::{test_dir, PagedFile};
use crate::errors::Error;
use crate::index::{AttrType, BTreeIndex, Operator};
use crate::record_id::RecordId;
use crate::relation::RelationFile;
use anyhow::Result;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::rc::Rc;

fn record(key: i32) -> Vec<u8> {
    let mut bytes = vec![0u8; 16];
    bytes[4..8].copy_from_slice(&key.to_ne_bytes());
    bytes
}

#[test]
fn scenario_1_small_scan_in_insertion_order() -> Result<()> {
    let dir = test_dir();
    let relation_dir = dir.join("relation");
    let records: Vec<Vec<u8>> = [5, 3, 8, 1].iter().map(|&k| record(k)).collect();
    let relation = RelationFile::build(&relation_dir, 16, &records)?;
    let mut index = BTreeIndex::build(&dir, "relation", 4, AttrType::Integer, 16, &relation)?;

    index.start_scan(0, Operator::Gte, 100, Operator::Lt)?;
    let mut keys = Vec::new();
    loop {
        match index.scan_next() {
            Ok(rid) => keys.push(rid),
            Err(_) => break,
        }
    }
    index.end_scan()?;

    // Insertion order was 5, 3, 8, 1; the scan must return them in key order,
    // with rids carried over from the relation's own slot assignment.
    let mut expected: Vec<(i32, RecordId)> = relation
        .scan(4)?
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .map(|(rid, key)| (key, rid))
        .collect();
    expected.sort_by_key(|(key, _)| *key);
    let expected: Vec<RecordId> = expected.into_iter().map(|(_, rid)| rid).collect();
    assert_eq!(keys, expected);

    drop(index);
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn scenario_2_sequential_insert_and_narrow_scan() -> Result<()> {
    let dir = test_dir();
    let relation_dir = dir.join("relation");
    let records: Vec<Vec<u8>> = (0..10000).map(record).collect();
    let relation = RelationFile::build(&relation_dir, 16, &records)?;
    let mut index = BTreeIndex::build(&dir, "relation", 4, AttrType::Integer, 64, &relation)?;

    index.start_scan(4999, Operator::Gt, 5002, Operator::Lte)?;
    let mut found = Vec::new();
    loop {
        match index.scan_next() {
            Ok(rid) => found.push(rid),
            Err(_) => break,
        }
    }
    index.end_scan()?;

    // The relation's own scan gives the ground-truth record ids for this
    // key range; the index scan must agree with it.
    let direct: Vec<RecordId> = relation
        .scan(4)?
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|(_, k)| (5000..=5002).contains(k))
        .map(|(rid, _)| rid)
        .collect();
    assert_eq!(found, direct);

    drop(index);
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn scenario_3_random_permutation_insert_and_full_scan() -> Result<()> {
    let dir = test_dir();
    let relation_dir = dir.join("relation");
    let mut keys: Vec<i32> = (0..10000).collect();
    keys.shuffle(&mut thread_rng());
    let records: Vec<Vec<u8>> = keys.iter().map(|&k| record(k)).collect();
    let relation = RelationFile::build(&relation_dir, 16, &records)?;
    let mut index = BTreeIndex::build(&dir, "relation", 4, AttrType::Integer, 64, &relation)?;

    index.start_scan(0, Operator::Gte, 9999, Operator::Lte)?;
    let mut count = 0usize;
    loop {
        match index.scan_next() {
            Ok(_) => count += 1,
            Err(_) => break,
        }
    }
    index.end_scan()?;

    assert_eq!(count, 10000);

    drop(index);
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn scenario_4_four_frame_pool_exhausted_by_pinning() -> Result<()> {
    let dir = test_dir();
    let file = Rc::new(PagedFile::create(&dir)?);
    let mut bpm = BufferPoolManager::new(4);

    for _ in 0..4 {
        bpm.alloc_page(&file)?;
    }

    let err = bpm.alloc_page(&file).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::BufferExceeded)));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn scenario_5_double_unpin_fails() -> Result<()> {
    let dir = test_dir();
    let file = Rc::new(PagedFile::create(&dir)?);
    let mut bpm = BufferPoolManager::new(4);

    let (page_no, _) = bpm.alloc_page(&file)?;
    bpm.unpin_page(&file, page_no, false)?;
    let err = bpm.unpin_page(&file, page_no, false).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::PageNotPinned { .. })));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn scenario_6_reopen_with_mismatched_attr_offset_fails() -> Result<()> {
    let dir = test_dir();
    let relation_dir = dir.join("relation");
    let records: Vec<Vec<u8>> = (0..100).map(record).collect();
    let relation = RelationFile::build(&relation_dir, 16, &records)?;
    let index = BTreeIndex::build(&dir, "relation", 4, AttrType::Integer, 16, &relation)?;
    drop(index);

    let err = BTreeIndex::open(&dir, "relation", 8, AttrType::Integer, 16).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::BadIndexInfo)));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
