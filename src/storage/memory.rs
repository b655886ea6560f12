use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use super::{check_page_io, DiskManager};
use crate::error::Result;
use crate::storage::page::PageId;

/// An in-memory disk. Clones share the same pages and counters, which
/// lets a caller keep an eye on the I/O after handing a clone over to
/// the buffer pool.
#[derive(Debug, Clone, Default)]
pub struct MemoryDisk {
    pages: Arc<Mutex<HashMap<PageId, Vec<u8>>>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryDisk {
    pub fn new() -> MemoryDisk {
        MemoryDisk::default()
    }

    /// Number of read_page calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write_page calls served so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of the stored page, None if it was never written.
    pub fn page(&self, page_id: PageId) -> Result<Option<Vec<u8>>> {
        let pages = self.pages.lock()?;
        Ok(pages.get(&page_id).cloned())
    }
}

impl DiskManager for MemoryDisk {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        check_page_io(page_id, buf.len())?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let pages = self.pages.lock()?;
        match pages.get(&page_id) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()> {
        check_page_io(page_id, buf.len())?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut pages = self.pages.lock()?;
        pages.insert(page_id, buf.to_vec());
        Ok(())
    }
}
