use serde::Deserialize;

use crate::error::{Error, Result};
use crate::storage::DiskType;

#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// The K of the LRU-K replacement policy.
    pub replacer_k: usize,

    pub disk_type: DiskType,
    /// Database file, only used by the file disk.
    pub data_file: String,

    pub log_level: String,
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("pool_size", 64)?
            .set_default("replacer_k", 2)?
            .set_default("disk_type", "memory")?
            .set_default("data_file", "bufpool.db")?
            .set_default("log_level", "info")?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("BUFPOOL"));
        let cfg: Config = cfg.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::Value("pool_size must be larger than zero".to_string()));
        }
        if self.replacer_k == 0 {
            return Err(Error::Value("replacer_k must be larger than zero".to_string()));
        }
        Ok(())
    }
}
