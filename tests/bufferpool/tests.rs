use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bufpool::error::{Error, Result};
use bufpool::storage::file::FileDisk;
use bufpool::storage::heap::BufferPoolManager;
use bufpool::storage::page::{PageId, PAGE_SIZE};
use log::info;
use rand::Rng;

fn stamp(bpm: &BufferPoolManager, page_id: PageId) -> Result<()> {
    let page = bpm.fetch_page(page_id)?.ok_or(Error::Internal("pool exhausted".to_string()))?;
    page.write()?.data_mut()[..8].copy_from_slice(&page_id.to_le_bytes());
    assert!(bpm.unpin_page(page_id, true)?);
    Ok(())
}

fn stamp_of(data: &[u8]) -> PageId {
    let mut id = [0u8; 8];
    id.copy_from_slice(&data[..8]);
    PageId::from_le_bytes(id)
}

#[test]
fn test_pages_outlive_the_pool() -> Result<()> {
    setup!(bpm, disk, 4, 2);

    // Scenario: many more pages than frames, each one keeps its own content.
    let mut page_ids = vec![];
    for _ in 0..32 {
        let (page_id, _) = bpm.new_page()?.expect("evictable frame");
        assert!(bpm.unpin_page(page_id, false)?);
        stamp(&bpm, page_id)?;
        page_ids.push(page_id);
    }
    assert!(disk.writes() >= 28);

    for &page_id in page_ids.iter().rev() {
        let page = bpm.fetch_page(page_id)?.expect("evictable frame");
        assert_eq!(page_id, stamp_of(page.read()?.data()));
        assert!(bpm.unpin_page(page_id, false)?);
    }
    assert_eq!(4, bpm.evictable_count()?);
    Ok(())
}

#[test]
fn test_file_disk_persistence() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pool.db");

    let bpm = BufferPoolManager::new(Box::new(FileDisk::open(&path)?), 3, 2);
    for _ in 0..10 {
        let (page_id, page) = bpm.new_page()?.expect("evictable frame");
        page.write()?.data_mut()[..8].copy_from_slice(&page_id.to_le_bytes());
        assert!(bpm.unpin_page(page_id, true)?);
    }
    bpm.flush_all_pages()?;
    drop(bpm);

    // Scenario: a fresh pool over the same file sees every page.
    let bpm = BufferPoolManager::new(Box::new(FileDisk::open(&path)?), 3, 2);
    for page_id in 0..10 {
        let page = bpm.fetch_page(page_id)?.expect("evictable frame");
        let guard = page.read()?;
        assert_eq!(PAGE_SIZE, guard.data().len());
        assert_eq!(page_id, stamp_of(guard.data()));
        drop(guard);
        assert!(bpm.unpin_page(page_id, false)?);
    }
    Ok(())
}

#[test]
fn test_concurrent_workload() -> Result<()> {
    setup!(bpm, disk, 8, 2);
    let num_pages = 64;
    for _ in 0..num_pages {
        let (page_id, _) = bpm.new_page()?.expect("evictable frame");
        assert!(bpm.unpin_page(page_id, false)?);
        stamp(&bpm, page_id)?;
    }

    let bpm = Arc::new(bpm);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || -> Result<usize> {
                let mut rng = rand::thread_rng();
                let mut fetched = 0;
                for _ in 0..2000 {
                    let page_id = rng.gen_range(0..num_pages);
                    // fewer threads than frames, a frame is always obtainable.
                    let page = bpm.fetch_page(page_id)?.expect("evictable frame");
                    assert_eq!(page_id, stamp_of(page.read()?.data()));
                    assert!(bpm.unpin_page(page_id, rng.gen_bool(0.3))?);
                    fetched += 1;
                }
                Ok(fetched)
            })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        total += handle.join().map_err(|_| Error::Internal("worker panicked".to_string()))??;
    }
    info!("{} fetches, {} reads, {} writes", total, disk.reads(), disk.writes());
    assert_eq!(8000, total);

    // Scenario: nothing is pinned anymore, every frame is evictable.
    assert_eq!(8, bpm.evictable_count()?);
    for page_id in 0..num_pages {
        assert_eq!(None, bpm.pin_count(page_id)?.filter(|&pins| pins > 0));
    }

    bpm.flush_all_pages()?;
    for page_id in 0..num_pages {
        let data = disk.page(page_id)?.expect("written back");
        assert_eq!(page_id, stamp_of(&data));
    }
    Ok(())
}

#[test]
fn test_delete_under_contention() -> Result<()> {
    setup!(bpm, disk, 2, 2);
    let (p0, _) = bpm.new_page()?.expect("free frame");
    let (p1, _) = bpm.new_page()?.expect("free frame");

    // Scenario: the pool is full of pinned pages, deleting one of them fails.
    assert!(!bpm.delete_page(p0)?);
    assert!(bpm.new_page()?.is_none());

    // Scenario: delete frees a frame, new pages take it without eviction.
    assert!(bpm.unpin_page(p0, false)?);
    assert!(bpm.delete_page(p0)?);
    assert!(bpm.delete_page(p0)?);
    let (p2, _) = bpm.new_page()?.expect("free frame");
    assert_eq!(2, p2);
    assert_eq!(Some(1), bpm.pin_count(p1)?);
    assert_eq!(0, disk.writes());
    Ok(())
}

#[test]
fn test_flush_while_page_latched() -> Result<()> {
    setup!(bpm, disk, 4, 2);
    let (p0, page0) = bpm.new_page()?.expect("free frame");
    let (p1, _) = bpm.new_page()?.expect("free frame");
    assert!(bpm.unpin_page(p1, false)?);

    // Scenario: p0 is pinned and write latched by its owner.
    let mut latch = page0.write()?;
    latch.data_mut()[..4].copy_from_slice(b"busy");

    let (tx, rx) = mpsc::channel();
    let flusher = {
        let bpm = bpm.clone();
        thread::spawn(move || -> Result<()> {
            tx.send(bpm.flush_page(p0)).map_err(|_| Error::Internal("receiver gone".to_string()))
        })
    };
    let flushed = rx
        .recv_timeout(Duration::from_secs(2))
        .map_err(|_| Error::Internal("flush blocked on the page latch".to_string()))?;
    assert!(matches!(flushed, Err(Error::Internal(_))));
    flusher.join().map_err(|_| Error::Internal("flusher panicked".to_string()))??;

    // Scenario: other pages stay reachable, from other threads and from the owner.
    let (tx, rx) = mpsc::channel();
    let fetcher = {
        let bpm = bpm.clone();
        thread::spawn(move || -> Result<()> {
            let fetched = bpm.fetch_page(p1)?.is_some();
            let unpinned = bpm.unpin_page(p1, false)?;
            tx.send(fetched && unpinned).map_err(|_| Error::Internal("receiver gone".to_string()))
        })
    };
    let fetched = rx
        .recv_timeout(Duration::from_secs(2))
        .map_err(|_| Error::Internal("fetch blocked behind the page latch".to_string()))?;
    assert!(fetched);
    fetcher.join().map_err(|_| Error::Internal("fetcher panicked".to_string()))??;
    assert_eq!(Some(0), bpm.pin_count(p1)?);
    assert_eq!(Some(1), bpm.pin_count(p0)?);
    assert_eq!(0, disk.writes());

    // Scenario: once the latch is released the flush goes through.
    drop(latch);
    assert!(bpm.flush_page(p0)?);
    assert_eq!(&b"busy"[..], &disk.page(p0)?.expect("flushed")[..4]);
    assert!(bpm.unpin_page(p0, false)?);
    Ok(())
}
