use std::ops::Deref;
use std::sync::RwLock;

pub type PageId = i64;

/// Index of a frame in the buffer pool, i.e., in range [0, pool_size).
pub type FrameId = usize;

/// Size of a data page in byte.
pub const PAGE_SIZE: usize = 4096;

/// Invalid page id, held by frames that are on the free list.
pub const INVALID_PAGE_ID: PageId = -1;

/// The in-memory bytes of a page together with the id of the
/// page it currently holds.
///
/// Pin count and dirty flag are owned by the buffer pool and only
/// change under its latch, see [`crate::storage::heap::bufferpool`].
pub struct PageData {
    id: PageId,
    data: Box<[u8]>,
}

impl PageData {
    fn new() -> Self {
        Self { id: INVALID_PAGE_ID, data: vec![0u8; PAGE_SIZE].into_boxed_slice() }
    }

    /// Id of the page held, INVALID_PAGE_ID for a free frame.
    pub fn id(&self) -> PageId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: PageId) {
        self.id = id;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reset the frame in place, no reallocation.
    pub(crate) fn clear(&mut self) {
        self.id = INVALID_PAGE_ID;
        self.data.fill(0);
    }
}

impl AsRef<[u8]> for PageData {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for PageData {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Page act as the container of the actual page data for
/// providing concurrent access protection.
///
/// The latch only guards the bytes. The buffer pool never waits on it,
/// an operation that finds it held fails instead.
pub struct Page {
    inner: RwLock<PageData>,
}

impl Page {
    /// Allocate a page in memory with the given PAGE_SIZE and init
    /// the metadata accordingly.
    pub fn new() -> Self {
        Page { inner: RwLock::new(PageData::new()) }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Page {
    type Target = RwLock<PageData>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[test]
    fn test_page_clear() -> Result<()> {
        let page = Page::new();
        {
            let mut guard = page.write()?;
            assert_eq!(INVALID_PAGE_ID, guard.id());
            assert_eq!(PAGE_SIZE, guard.data().len());
            guard.set_id(7);
            guard.data_mut()[..5].copy_from_slice(b"hello");
        }
        let mut guard = page.write()?;
        assert_eq!(b"hello", &guard.as_ref()[..5]);
        guard.clear();
        assert_eq!(INVALID_PAGE_ID, guard.id());
        assert!(guard.data().iter().all(|&b| b == 0));
        assert_eq!(PAGE_SIZE, guard.data().len());
        Ok(())
    }
}
