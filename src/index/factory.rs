//! Index file-set factories: where generations live on disk and how a
//! staged generation is published.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::IndexConfig;
use crate::error::{PilumError, Result};
use crate::index::{CombinedIndexReader, INDEX_FILES};

pub trait IndexFactory: Send + Sync {
    /// Make the staged generation the live one.
    fn switch_files(&self) -> Result<()>;

    /// Open a reader over the live generation.
    fn combined_index_reader(&self) -> Result<CombinedIndexReader>;
}

/// Stages generations in `{index_dir}/next/` and publishes them into
/// `{index_dir}/current/` by renaming file by file.
#[derive(Debug, Clone)]
pub struct DirectoryIndexFactory {
    current_dir: PathBuf,
    next_dir: PathBuf,
}

impl DirectoryIndexFactory {
    pub fn new(config: &IndexConfig) -> Self {
        DirectoryIndexFactory {
            current_dir: config.current_dir(),
            next_dir: config.next_dir(),
        }
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn next_dir(&self) -> &Path {
        &self.next_dir
    }

    /// Whether a generation is waiting in the staging directory.
    pub fn has_staged(&self) -> bool {
        INDEX_FILES.iter().any(|f| self.next_dir.join(f).exists())
    }
}

impl IndexFactory for DirectoryIndexFactory {
    fn switch_files(&self) -> Result<()> {
        if !self.has_staged() {
            return Err(PilumError::index(format!(
                "no staged index generation in {}",
                self.next_dir.display()
            )));
        }
        fs::create_dir_all(&self.current_dir)?;

        for name in INDEX_FILES {
            let staged = self.next_dir.join(name);
            let live = self.current_dir.join(name);
            if staged.exists() {
                fs::rename(&staged, &live).map_err(|e| {
                    PilumError::index(format!(
                        "Failed to move {} to {}: {e}",
                        staged.display(),
                        live.display()
                    ))
                })?;
                debug!("Published {}", live.display());
            } else if live.exists() {
                // Files absent from the new generation must not linger from the old.
                fs::remove_file(&live)?;
                debug!("Removed stale {}", live.display());
            }
        }

        info!("Switched index files into {}", self.current_dir.display());
        Ok(())
    }

    fn combined_index_reader(&self) -> Result<CombinedIndexReader> {
        CombinedIndexReader::open(&self.current_dir)
    }
}
