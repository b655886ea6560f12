use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use log::error;

use super::bufferpool::BufferPoolManager;
use crate::error::Result;
use crate::storage::page::{Page, PageData, PageId};

/// A pinned page that unpins itself when dropped.
///
/// Writing through the guard marks the page dirty, the unpin on drop
/// carries the flag to the buffer pool.
pub struct PageGuard {
    bpm: BufferPoolManager,
    page_id: PageId,
    page: Arc<Page>,
    is_dirty: bool,
}

impl PageGuard {
    fn new(bpm: BufferPoolManager, page_id: PageId, page: Arc<Page>) -> Self {
        PageGuard { bpm, page_id, page, is_dirty: false }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Latch the page for reading.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, PageData>> {
        Ok(self.page.read()?)
    }

    /// Latch the page for writing, the page will be unpinned as dirty.
    pub fn write(&mut self) -> Result<RwLockWriteGuard<'_, PageData>> {
        self.is_dirty = true;
        Ok(self.page.write()?)
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        match self.bpm.unpin_page(self.page_id, self.is_dirty) {
            Ok(true) => {}
            Ok(false) => error!("page {} was unpinned behind its guard", self.page_id),
            Err(err) => error!("failed to unpin page {}: {}", self.page_id, err),
        }
    }
}

impl BufferPoolManager {
    /// Same as new_page, with the pin held by the returned guard.
    pub fn new_page_guarded(&self) -> Result<Option<PageGuard>> {
        let page = self.new_page()?;
        Ok(page.map(|(page_id, page)| PageGuard::new(self.clone(), page_id, page)))
    }

    /// Same as fetch_page, with the pin held by the returned guard.
    pub fn fetch_page_guarded(&self, page_id: PageId) -> Result<Option<PageGuard>> {
        let page = self.fetch_page(page_id)?;
        Ok(page.map(|page| PageGuard::new(self.clone(), page_id, page)))
    }
}
