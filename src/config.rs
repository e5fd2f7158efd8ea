//! Configuration for index construction and serving.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PilumError, Result};

/// Configuration for an index installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Root directory holding the `current/` and `next/` generations.
    pub index_dir: PathBuf,

    /// Directory for temporary preindex files.
    /// If None, uses `{index_dir}/tmp`.
    pub work_dir: Option<PathBuf>,

    /// Capacity of the reusable query buffer.
    pub lookup_batch_size: usize,

    /// Target size of each result batch handed to the sink.
    pub results_batch_size: usize,

    /// How long a retired reader is kept alive after an index switch.
    pub close_delay_secs: u64,

    /// Term flag mask admitting a posting into the priority tier.
    pub priority_term_flags: u8,

    /// Thread pool size for per-shard preindex construction.
    pub construction_threads: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("index"),
            work_dir: None,
            lookup_batch_size: 512,
            results_batch_size: 512,
            close_delay_secs: 60,
            priority_term_flags: 0xFF,
            construction_threads: num_cpus::get(),
        }
    }
}

impl IndexConfig {
    /// Create a configuration rooted at `index_dir` with default settings.
    pub fn new<P: Into<PathBuf>>(index_dir: P) -> Self {
        Self {
            index_dir: index_dir.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PilumError::invalid_argument(format!("Cannot read config {}: {e}", path.display()))
        })?;
        let config: IndexConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookup_batch_size == 0 {
            return Err(PilumError::invalid_argument("lookup_batch_size must be positive"));
        }
        if self.results_batch_size == 0 {
            return Err(PilumError::invalid_argument("results_batch_size must be positive"));
        }
        if self.construction_threads == 0 {
            return Err(PilumError::invalid_argument("construction_threads must be positive"));
        }
        Ok(())
    }

    /// Directory for temporary construction files.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| self.index_dir.join("tmp"))
    }

    /// Directory of the live generation.
    pub fn current_dir(&self) -> PathBuf {
        self.index_dir.join("current")
    }

    /// Directory of the staged generation.
    pub fn next_dir(&self) -> PathBuf {
        self.index_dir.join("next")
    }

    pub fn close_delay(&self) -> Duration {
        Duration::from_secs(self.close_delay_secs)
    }

    pub fn with_work_dir<P: Into<PathBuf>>(mut self, work_dir: P) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay_secs = delay.as_secs();
        self
    }

    pub fn with_construction_threads(mut self, threads: usize) -> Self {
        self.construction_threads = threads;
        self
    }

    pub fn with_batch_sizes(mut self, lookup: usize, results: usize) -> Self {
        self.lookup_batch_size = lookup;
        self.results_batch_size = results;
        self
    }
}
