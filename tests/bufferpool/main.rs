macro_rules! setup {
    ($bpm:ident, $disk:ident, $pool_size:expr, $k:expr) => {
        let _ = env_logger::builder().is_test(true).try_init();
        let $disk = bufpool::storage::memory::MemoryDisk::new();
        let $bpm = bufpool::storage::heap::BufferPoolManager::new(
            Box::new($disk.clone()),
            $pool_size,
            $k,
        );
    };
}

mod tests;
