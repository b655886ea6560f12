use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{check_page_io, DiskManager};
use crate::error::Result;
use crate::storage::page::{PageId, PAGE_SIZE};

/// A disk backed by a single database file, page `n` lives at byte
/// offset `n * PAGE_SIZE`.
#[derive(Debug)]
pub struct FileDisk {
    path: PathBuf,
    file: File,
}

impl FileDisk {
    /// Open the database file, creating it if it does not exist yet.
    /// Existing content is kept.
    pub fn open(path: impl AsRef<Path>) -> Result<FileDisk> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        Ok(FileDisk { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages the file spans, a partially written tail page counts.
    pub fn num_pages(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE as u64))
    }

    fn offset(page_id: PageId) -> Result<u64> {
        let page_id = u64::try_from(page_id)?;
        Ok(page_id * PAGE_SIZE as u64)
    }
}

impl DiskManager for FileDisk {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        check_page_io(page_id, buf.len())?;
        self.file.seek(SeekFrom::Start(Self::offset(page_id)?))?;
        // the page may lie (partially) beyond the end of the file, whatever
        // was not read is zero.
        let mut read = 0;
        while read < buf.len() {
            let n = self.file.read(&mut buf[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        buf[read..].fill(0);
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()> {
        check_page_io(page_id, buf.len())?;
        self.file.seek(SeekFrom::Start(Self::offset(page_id)?))?;
        self.file.write_all(buf)?;
        self.file.sync_data()?;
        Ok(())
    }
}
