use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use bufpool::config::Config;
use bufpool::error::{Error, Result};
use bufpool::storage::heap::BufferPoolManager;
use bufpool::storage::page::PageId;
use log::{info, warn};
use rand::Rng;

/// Drive a random fetch/unpin workload against the configured buffer pool.
fn main() -> Result<()> {
    let args = clap::command!()
        .arg(
            clap::Arg::new("config")
                .short('c')
                .long("config")
                .help("Configuration file path for the buffer pool")
                .default_value(""),
        )
        .arg(
            clap::Arg::new("pages")
                .short('p')
                .long("pages")
                .help("Number of pages in the workload")
                .value_parser(clap::value_parser!(usize))
                .default_value("256"),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .value_parser(clap::value_parser!(usize))
                .default_value("4"),
        )
        .arg(
            clap::Arg::new("ops")
                .long("ops")
                .help("Operations per thread")
                .value_parser(clap::value_parser!(usize))
                .default_value("10000"),
        )
        .get_matches();
    let file = args.get_one::<String>("config").map(String::as_str).unwrap_or_default();
    let cfg = Config::new(file)?;
    let loglevel = cfg.log_level.parse::<simplelog::LevelFilter>()?;
    let mut logconfig = simplelog::ConfigBuilder::new();
    simplelog::SimpleLogger::init(loglevel, logconfig.build())?;

    let num_pages = args.get_one::<usize>("pages").copied().unwrap_or(256);
    let threads = args.get_one::<usize>("threads").copied().unwrap_or(4);
    let ops = args.get_one::<usize>("ops").copied().unwrap_or(10000);

    let bpm = BufferPoolManager::try_from_config(&cfg)?;
    info!(
        "buffer pool with {} frames, k = {}, {:?} disk",
        cfg.pool_size, cfg.replacer_k, cfg.disk_type
    );

    // every page starts with its own id, checked on each fetch.
    let mut page_ids = Vec::with_capacity(num_pages);
    for _ in 0..num_pages {
        let (page_id, page) = bpm
            .new_page()?
            .ok_or_else(|| Error::Internal("buffer pool exhausted while loading".to_string()))?;
        page.write()?.data_mut()[..8].copy_from_slice(&page_id.to_le_bytes());
        release(&bpm, page_id, true)?;
        page_ids.push(page_id);
    }

    let fetched = AtomicUsize::new(0);
    let exhausted = AtomicUsize::new(0);
    let start = Instant::now();
    thread::scope(|s| -> Result<()> {
        let workers: Vec<_> = (0..threads)
            .map(|_| s.spawn(|| run_worker(&bpm, &page_ids, ops, &fetched, &exhausted)))
            .collect();
        for worker in workers {
            worker.join().map_err(|_| Error::Internal("worker panicked".to_string()))??;
        }
        Ok(())
    })?;
    bpm.flush_all_pages()?;

    let elapsed = start.elapsed();
    info!(
        "{} fetches, {} rejected with all frames pinned, in {:?}",
        fetched.load(Ordering::SeqCst),
        exhausted.load(Ordering::SeqCst),
        elapsed
    );
    Ok(())
}

fn run_worker(
    bpm: &BufferPoolManager,
    page_ids: &[PageId],
    ops: usize,
    fetched: &AtomicUsize,
    exhausted: &AtomicUsize,
) -> Result<()> {
    let mut rng = rand::thread_rng();
    for _ in 0..ops {
        if page_ids.is_empty() {
            break;
        }
        let page_id = page_ids[rng.gen_range(0..page_ids.len())];
        let Some(page) = bpm.fetch_page(page_id)? else {
            exhausted.fetch_add(1, Ordering::SeqCst);
            continue;
        };
        fetched.fetch_add(1, Ordering::SeqCst);

        let is_dirty = rng.gen_bool(0.2);
        {
            let mut guard = page.write()?;
            let mut id = [0u8; 8];
            id.copy_from_slice(&guard.data()[..8]);
            if PageId::from_le_bytes(id) != page_id {
                warn!("page {} holds data of page {}", page_id, PageId::from_le_bytes(id));
            }
            if is_dirty {
                let counter = guard.data()[8].wrapping_add(1);
                guard.data_mut()[8] = counter;
            }
        }
        release(bpm, page_id, is_dirty)?;
    }
    Ok(())
}

/// Unpin a page, warning when the pool did not hold a pin for it.
fn release(bpm: &BufferPoolManager, page_id: PageId, is_dirty: bool) -> Result<bool> {
    let unpinned = bpm.unpin_page(page_id, is_dirty)?;
    if !unpinned {
        warn!("page {} was not pinned when released", page_id);
    }
    Ok(unpinned)
}
