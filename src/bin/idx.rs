//! Manual exercise driver for the B+-tree index: builds an index over an
//! on-disk relation file, or runs a range scan against an existing one.

use anyhow::{bail, Context, Result};
use bptree_index::config::Config;
use bptree_index::index::{AttrType, BTreeIndex, Operator};
use bptree_index::relation::RelationFile;
use std::path::Path;

fn usage() -> ! {
    eprintln!("usage:");
    eprintln!("  idx build <relation> <offset> <record_size>");
    eprintln!("  idx scan <relation> <offset> <low> <high>");
    std::process::exit(1);
}

fn main() -> Result<()> {
    let config = Config::from_env();
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, relation, offset, record_size] if cmd == "build" => {
            run_build(&config.data_dir, relation, offset, record_size, config.buffer_pool_frames)
        }
        [cmd, relation, offset, low, high] if cmd == "scan" => {
            run_scan(&config.data_dir, relation, offset, low, high, config.buffer_pool_frames)
        }
        _ => usage(),
    }
}

fn run_build(
    data_dir: &Path,
    relation_name: &str,
    offset: &str,
    record_size: &str,
    buffer_pool_frames: usize,
) -> Result<()> {
    let offset: u32 = offset.parse().context("offset must be a non-negative integer")?;
    let record_size: usize = record_size
        .parse()
        .context("record_size must be a positive integer")?;

    let relation_dir = data_dir.join(relation_name);
    if !relation_dir.is_dir() {
        bail!("relation file not found: {}", relation_dir.display());
    }
    let relation = RelationFile::open(&relation_dir, record_size)?;

    let index = BTreeIndex::build(
        data_dir,
        relation_name,
        offset,
        AttrType::Integer,
        buffer_pool_frames,
        &relation,
    )?;

    println!("built index {}.{}", index.relation_name(), index.attr_offset());
    Ok(())
}

fn run_scan(
    data_dir: &Path,
    relation_name: &str,
    offset: &str,
    low: &str,
    high: &str,
    buffer_pool_frames: usize,
) -> Result<()> {
    let offset: u32 = offset.parse().context("offset must be a non-negative integer")?;
    let low: i32 = low.parse().context("low must be an integer")?;
    let high: i32 = high.parse().context("high must be an integer")?;

    let mut index = BTreeIndex::open(data_dir, relation_name, offset, AttrType::Integer, buffer_pool_frames)?;
    index.start_scan(low, Operator::Gte, high, Operator::Lte)?;

    let mut count = 0usize;
    loop {
        match index.scan_next() {
            Ok(rid) => {
                println!("page={} slot={}", rid.page_no, rid.slot_no);
                count += 1;
            }
            Err(e) => {
                use bptree_index::errors::Error;
                if matches!(e.downcast_ref::<Error>(), Some(Error::IndexScanCompleted)) {
                    break;
                }
                return Err(e);
            }
        }
    }
    index.end_scan()?;

    eprintln!("{count} matching records");
    Ok(())
}
