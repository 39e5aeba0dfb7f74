//! Concrete on-disk file abstraction: page allocation, read, write, delete,
//! and page-id iteration.
//!
//! One physical directory per logical file, one OS file per page.

use crate::errors::Error;
use crate::page::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::printdbg;
use anyhow::{Context, Result};
use std::cell::Cell;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// A disk-backed, page-addressable file.
///
/// Two handles opened separately for the same path are two distinct
/// `PagedFile` values even though they refer to the same directory on disk;
/// `flush_file`/`dispose_page` compare files by handle identity
/// (`Rc::ptr_eq` on a shared handle), not by path. Callers must route all
/// access to one logical file through a single cloned `Rc<PagedFile>`.
#[derive(Debug)]
pub struct PagedFile {
    dir: PathBuf,
    next_page_id: Cell<PageId>,
}

impl PagedFile {
    pub fn exists(dir: &Path) -> bool {
        dir.is_dir()
    }

    /// Creates a brand-new, empty paged file at `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            next_page_id: Cell::new(1),
        })
    }

    /// Opens a paged file that already exists, recovering the next page id
    /// from the highest page number currently on disk.
    pub fn open(dir: &Path) -> Result<Self> {
        if !Self::exists(dir) {
            return Err(Error::FileNotFound {
                path: dir.display().to_string(),
            }
            .into());
        }

        let max_existing = Self::page_ids_in(dir)?.into_iter().max().unwrap_or(0);

        Ok(Self {
            dir: dir.to_path_buf(),
            next_page_id: Cell::new(max_existing + 1),
        })
    }

    fn page_path(&self, page_no: PageId) -> PathBuf {
        self.dir.join(page_no.to_string())
    }

    fn page_ids_in(dir: &Path) -> Result<Vec<PageId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("reading directory {}", dir.display()))?
        {
            let entry = entry?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<PageId>().ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Every page number currently allocated, in ascending order.
    pub fn page_ids(&self) -> Result<Vec<PageId>> {
        let mut ids = Self::page_ids_in(&self.dir)?;
        ids.sort_unstable();
        Ok(ids)
    }

    /// Allocates and persists a fresh, zeroed page, returning its id.
    pub fn allocate_page(&self) -> Result<(PageId, Page)> {
        let page_no = self.next_page_id.get();
        self.next_page_id.set(page_no + 1);

        let page = Page::new();
        self.write_page(page_no, &page)?;
        printdbg!("allocated page {page_no} in {}", self.dir.display());

        Ok((page_no, page))
    }

    pub fn read_page(&self, page_no: PageId) -> Result<Page> {
        if page_no == INVALID_PAGE_ID {
            return Err(Error::FileNotFound {
                path: "page 0 (invalid)".into(),
            }
            .into());
        }

        let path = self.page_path(page_no);
        let mut file = OpenOptions::new().read(true).open(&path).map_err(|_| {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        })?;

        let mut buffer = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut buffer)
            .with_context(|| format!("reading page {page_no}"))?;

        Ok(Page::from_bytes(&buffer))
    }

    pub fn write_page(&self, page_no: PageId, page: &Page) -> Result<()> {
        let path = self.page_path(page_no);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("opening page {page_no} for write"))?;

        file.write_all(page.as_bytes())
            .with_context(|| format!("writing page {page_no}"))?;

        Ok(())
    }

    pub fn delete_page(&self, page_no: PageId) -> Result<()> {
        let path = self.page_path(page_no);
        std::fs::remove_file(&path).with_context(|| format!("deleting page {page_no}"))?;
        Ok(())
    }
}

#[cfg(test)]
pub fn test_dir() -> PathBuf {
    use uuid::Uuid;
    std::env::temp_dir().join(format!("idx-test-{}", Uuid::new_v4()))
}
