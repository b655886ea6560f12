use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, TryLockError};

use log::{debug, trace};

use super::replacer::{Replacer, SyncLRUKReplacer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::page::{FrameId, Page, PageId, INVALID_PAGE_ID};
use crate::storage::{new_disk, DiskManager};

/// Bookkeeping of a frame, only touched under the buffer pool latch.
struct Frame {
    page: Arc<Page>,
    /// id of the page held by the frame, INVALID_PAGE_ID when free.
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl Frame {
    fn new() -> Self {
        let page = Arc::new(Page::new());
        Frame { page, page_id: INVALID_PAGE_ID, pin_count: 0, is_dirty: false }
    }

    fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}

/// The buffer pool is responsible for moving physical pages back and forth
/// from main memory to disk. It allows a DBMS to support databases that are
/// larger than the amount of memory available to the system.
///
/// The buffer pool's operations are transparent to other parts in the system.
/// For example, the system asks the buffer pool for a page using its unique
/// identifier (page_id) and it does not know whether that page is already in
/// memory or whether the system has to retrieve it from disk.
///
/// Every frame is either free (on the free list), pinned (in the page table
/// with pin count > 0) or unpinned (in the page table, pin count 0 and
/// evictable in the replacer).
struct BufferPool {
    /// disk the pages are read from and written back to.
    disk: Box<dyn DiskManager>,
    /// array of buffer pool frames. use the array index as
    /// FrameId, i.e., the FrameId is in range: [0, pool_size).
    frames: Vec<Frame>,
    /// page table for keeping track of buffer pool pages.
    page_table: HashMap<PageId, FrameId>,
    /// list of free frames that don't have any pages on them.
    free_list: VecDeque<FrameId>,
    /// Replacer to find unpinned pages for replacement.
    replacer: Arc<dyn Replacer>,
    /// The next page id to be allocated.
    next_page_id: PageId,
}

impl BufferPool {
    fn new(disk: Box<dyn DiskManager>, pool_size: usize, replacer_k: usize) -> Self {
        let replacer: Arc<dyn Replacer> = Arc::new(SyncLRUKReplacer::new(replacer_k, pool_size));
        let frames = (0..pool_size).map(|_| Frame::new()).collect();
        // initially, every frame is in the free list
        let free_list = (0..pool_size).collect();
        let page_table = HashMap::new();
        BufferPool { disk, frames, page_table, free_list, replacer, next_page_id: 0 }
    }

    /// Pick a frame from the free list, or evict one through the replacer
    /// when the free list is empty. A dirty victim is written back and its
    /// page unlinked from the page table. Return None if every frame is
    /// pinned.
    fn acquire_frame(&mut self) -> Result<Option<FrameId>> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(Some(frame_id));
        }
        let Some(frame_id) = self.replacer.evict() else {
            debug!("no evictable frame, all {} frames are pinned", self.frames.len());
            return Ok(None);
        };

        let frame = &mut self.frames[frame_id];
        debug!("evict page {} from frame {}", frame.page_id, frame_id);
        if frame.is_dirty {
            debug!("write back dirty page {}", frame.page_id);
            if let Err(err) = write_back(self.disk.as_mut(), frame) {
                // keep the page resident and give it back to the replacer.
                self.replacer.record_access(frame_id)?;
                self.replacer.set_evictable(frame_id, true)?;
                return Err(err);
            }
            frame.is_dirty = false;
        }
        self.page_table.remove(&frame.page_id);
        frame.reset();
        Ok(Some(frame_id))
    }

    /// Put an acquired frame back to the free list after a failure.
    fn release_frame(&mut self, frame_id: FrameId) {
        let frame = &mut self.frames[frame_id];
        frame.reset();
        match frame.page.try_write() {
            Ok(mut guard) => guard.clear(),
            Err(TryLockError::Poisoned(err)) => err.into_inner().clear(),
            // the bytes are overwritten whenever the frame is handed out again.
            Err(TryLockError::WouldBlock) => debug!("frame {} is latched, not cleared", frame_id),
        }
        self.free_list.push_back(frame_id);
    }

    /// Link the page to the frame and pin it for the caller.
    fn install(&mut self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &mut self.frames[frame_id];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)
    }

    /// Create a new page in the buffer pool, return the newly created page or None if all
    /// frames are currently in use and not evictable(in another word, pinned).
    ///
    /// Pick the replacement frame from either the free list or the replacer(always find from
    /// the free list first), and then call allocate_page to get a new page id. If the replacement
    /// frame has a dirty page, write it back to the disk first. reset the memory and metadata
    /// for the new page.
    ///
    /// The frame is "pinned" by calling replacer.set_evictable(frame_id, false) so that
    /// the replacer wouldn't evict the frame before the buffer pool manager "unpin" it.
    fn new_page(&mut self) -> Result<Option<(PageId, Arc<Page>)>> {
        let Some(frame_id) = self.acquire_frame()? else {
            return Ok(None);
        };
        let page_id = self.allocate_page();
        let page = Arc::clone(&self.frames[frame_id].page);
        let reset = page
            .try_write()
            .map(|mut guard| {
                guard.clear();
                guard.set_id(page_id);
            })
            .map_err(Error::from);
        if let Err(err) = reset {
            self.release_frame(frame_id);
            return Err(err);
        }
        self.install(frame_id, page_id)?;
        trace!("new page {} in frame {}", page_id, frame_id);
        Ok(Some((page_id, page)))
    }

    /// Fetch the requested page with the given page id from the buffer pool. return
    /// None if the page need to be fetched from disk but all frames are currently in
    /// use and not evictable(in other words, pinned).
    ///
    /// First search for page_id in the buffer pool. if not found, pick a replacement from
    /// either the free list or the replacer(always find from the free list first), read the
    /// page from the disk and replace the old page in the frame. similar to the new_page,
    /// if the old page is dirty, it is written back to the disk first.
    fn fetch_page(&mut self, page_id: PageId) -> Result<Option<Arc<Page>>> {
        if page_id < 0 {
            return Err(Error::Value(format!("invalid page id {}", page_id)));
        }
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            // we have the page frame in buffer pool already, increase pin
            // count, record frame access then return it.
            let frame = &mut self.frames[frame_id];
            frame.pin_count += 1;
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false)?;
            trace!("hit page {} in frame {}", page_id, frame_id);
            return Ok(Some(Arc::clone(&frame.page)));
        }

        let Some(frame_id) = self.acquire_frame()? else {
            return Ok(None);
        };
        trace!("miss page {}, load into frame {}", page_id, frame_id);
        let page = Arc::clone(&self.frames[frame_id].page);
        if let Err(err) = self.load(&page, page_id) {
            self.release_frame(frame_id);
            return Err(err);
        }
        self.install(frame_id, page_id)?;
        Ok(Some(page))
    }

    fn load(&mut self, page: &Page, page_id: PageId) -> Result<()> {
        let mut guard = page.try_write()?;
        self.disk.read_page(page_id, guard.data_mut())?;
        guard.set_id(page_id);
        Ok(())
    }

    /// Unpin the target page from the buffer pool. If page_id is not in the buffer pool
    /// or its pin count is already 0, return false without touching anything.
    ///
    /// Decrement the pin count of a page. If the pin count reaches 0, the frame should
    /// be evictable by the replacer. The dirty flag is only ever set here, never
    /// cleared.
    fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &mut self.frames[frame_id];
        if frame.pin_count == 0 {
            return Ok(false);
        }
        frame.pin_count -= 1;
        frame.is_dirty |= is_dirty;
        if frame.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true)?;
        }
        Ok(true)
    }

    /// Flush the target to disk regardless of the dirty flag.
    /// unset the dirty flag of the page after flushing.
    ///
    /// Return false if the page cannot be found in the page table,
    /// true otherwise.
    fn flush_page(&mut self, page_id: PageId) -> Result<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &mut self.frames[frame_id];
        write_back(self.disk.as_mut(), frame)?;
        frame.is_dirty = false;
        Ok(true)
    }

    /// Flush all the resident pages in the buffer pool to disk.
    fn flush_all_pages(&mut self) -> Result<()> {
        for frame in self.frames.iter_mut().filter(|frame| frame.page_id != INVALID_PAGE_ID) {
            write_back(self.disk.as_mut(), frame)?;
            frame.is_dirty = false;
        }
        Ok(())
    }

    /// Delete a page from buffer pool. if a page is not in the buffer pool, do nothing
    /// and return true. if the page is pinned and cannot be deleted, return false immediately.
    ///
    /// A dirty page is written back first. After deleting the page from the page table,
    /// stop tracking the frame in replacer and add back the frame to the free list. Also
    /// reset the page frame's memory and metadata.
    fn delete_page(&mut self, page_id: PageId) -> Result<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &mut self.frames[frame_id];
        if frame.pin_count > 0 {
            return Ok(false);
        }
        if frame.is_dirty {
            write_back(self.disk.as_mut(), frame)?;
            frame.is_dirty = false;
        }
        self.replacer.remove(frame_id)?;
        self.page_table.remove(&page_id);
        self.release_frame(frame_id);
        self.deallocate_page(page_id);
        debug!("deleted page {}, frame {} is free", page_id, frame_id);
        Ok(true)
    }

    fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        page_id
    }

    /// Page ids are never reused, there is nothing to reclaim on disk yet.
    fn deallocate_page(&mut self, page_id: PageId) {
        trace!("deallocate page {}", page_id);
    }

    fn frame_of(&self, page_id: PageId) -> Option<&Frame> {
        self.page_table.get(&page_id).map(|&frame_id| &self.frames[frame_id])
    }
}

/// Write the bytes held by the frame to disk under its page id. Runs under
/// the buffer pool latch, so the page latch is only tried: a page latched
/// by a caller fails the write back instead of stalling the whole pool.
fn write_back(disk: &mut dyn DiskManager, frame: &Frame) -> Result<()> {
    let guard = frame.page.try_read()?;
    disk.write_page(frame.page_id, guard.data())
}

/// Buffer pool manager wrap buffer pool with a mutex for concurrent access,
/// basically all the heavy lifting are happens in the buffer pool.
///
/// Every operation holds the latch from start to end, disk I/O included, so
/// operations fully serialize against each other. The replacer has its own
/// latch which is only ever taken while holding the buffer pool latch. Page
/// latches are never waited on: flushing, evicting or deleting a page whose
/// latch is held by a caller fails with [`Error::Internal`].
///
/// Every page handed out by new_page or fetch_page is pinned on behalf of the
/// caller, who must call unpin_page exactly once for it. See
/// [`super::guard::PageGuard`] for the scoped version.
#[derive(Clone)]
pub struct BufferPoolManager {
    /// hold the actual buffer pool protected by a mutex latch.
    inner: Arc<Mutex<BufferPool>>,
    pool_size: usize,
}

impl BufferPoolManager {
    pub fn new(disk: Box<dyn DiskManager>, pool_size: usize, replacer_k: usize) -> Self {
        let inner = BufferPool::new(disk, pool_size, replacer_k);
        BufferPoolManager { inner: Arc::new(Mutex::new(inner)), pool_size }
    }

    /// Build a buffer pool over the disk described by the config.
    pub fn try_from_config(cfg: &Config) -> Result<Self> {
        cfg.validate()?;
        let disk = new_disk(cfg.disk_type, &cfg.data_file)?;
        Ok(Self::new(disk, cfg.pool_size, cfg.replacer_k))
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Create a new page in buffer pool, the page comes back pinned.
    /// None if every frame is pinned.
    pub fn new_page(&self) -> Result<Option<(PageId, Arc<Page>)>> {
        let mut inner = self.inner.lock()?;
        inner.new_page()
    }

    /// Fetch the request page with the give page id from the buffer pool,
    /// the page comes back pinned. None if the page is not resident and
    /// every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<Arc<Page>>> {
        let mut inner = self.inner.lock()?;
        inner.fetch_page(page_id)
    }

    /// Unpin the target page from the buffer pool. If page_id is not in the buffer pool
    /// or its pin count is already 0, return false.
    ///
    /// Decrement the pin count of a page. If the pin count reaches 0, the frame should
    /// be evictable by the replacer. Also, set the dirty flag on the page to indicate if
    /// the page was modified.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.unpin_page(page_id, is_dirty)
    }

    /// Flush the target to disk regardless of the dirty flag.
    /// unset the dirty flag of the page after flushing. Fails if the
    /// page is latched for writing at the moment.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.flush_page(page_id)
    }

    /// Flush all the pages in the buffer pool to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        inner.flush_all_pages()
    }

    /// Delete a page from buffer pool. if a page is not in the buffer pool, do nothing
    /// and return true. if the page is pinned and cannot be deleted, return false immediately.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.delete_page(page_id)
    }

    /// Pin count of a resident page, None if the page is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Result<Option<u32>> {
        let inner = self.inner.lock()?;
        Ok(inner.frame_of(page_id).map(|frame| frame.pin_count))
    }

    /// Dirty flag of a resident page, None if the page is not resident.
    pub fn is_dirty(&self, page_id: PageId) -> Result<Option<bool>> {
        let inner = self.inner.lock()?;
        Ok(inner.frame_of(page_id).map(|frame| frame.is_dirty))
    }

    /// Number of frames the replacer may evict right now.
    pub fn evictable_count(&self) -> Result<usize> {
        let inner = self.inner.lock()?;
        Ok(inner.replacer.size())
    }
}
