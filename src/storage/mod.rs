use std::fmt::Debug;

use serde::Deserialize;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::page::{PageId, PAGE_SIZE};

pub mod file;
pub mod heap;
pub mod memory;
pub mod page;

/// A disk manager reads and writes whole pages keyed by page id. Both
/// operations are synchronous, a page written is durable once
/// write_page returns.
///
/// The buffers handed in are always exactly PAGE_SIZE long. Reading a
/// page that has never been written fills the buffer with zeros.
///
/// The DiskManager trait is designed as `trait object` compatible so the
/// buffer pool can own any implementation behind a `Box<dyn DiskManager>`.
pub trait DiskManager: Debug + Send {
    /// Fill the buffer with the durable content of the given page.
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()>;

    /// Persist the buffer as the content of the given page.
    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()>;
}

/// Reject negative page ids and buffers of the wrong size.
pub(crate) fn check_page_io(page_id: PageId, len: usize) -> Result<()> {
    if page_id < 0 {
        return Err(Error::Value(format!("invalid page id {}", page_id)));
    }
    if len != PAGE_SIZE {
        return Err(Error::Value(format!("page buffer size {} != {}", len, PAGE_SIZE)));
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    Memory,
    File,
}

/// Create a disk manager of the given type, `path` is only used by the
/// file disk.
pub fn new_disk(typ: DiskType, path: &str) -> Result<Box<dyn DiskManager>> {
    match typ {
        DiskType::Memory => Ok(Box::new(memory::MemoryDisk::new())),
        DiskType::File => Ok(Box::new(file::FileDisk::open(path)?)),
    }
}
