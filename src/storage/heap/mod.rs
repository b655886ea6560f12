//! The buffer pool: page frames, the page table, the LRU-K replacer and the
//! manager tying them to a disk.

pub mod bufferpool;
pub mod guard;
pub mod replacer;

pub use bufferpool::BufferPoolManager;
pub use guard::PageGuard;
