//! Builds a complete index generation from a directory of journals.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::forward::ForwardIndexConverter;
use crate::index::combined::{FULL_TIER, PRIORITY_TIER};
use crate::index::{
    INDEX_FILES, POSITIONS_FILE, REV_FULL_DOCS, REV_FULL_WORDS, REV_PRIO_DOCS, REV_PRIO_WORDS,
};
use crate::journal::IndexJournal;
use crate::model::{DocIdRewriter, IdentityRewriter};
use crate::positions::PositionsWriter;
use crate::preindex::{FinalizeStats, FullTierEncoder, PriorityTierEncoder};
use crate::reverse::ReverseIndexConstructor;

/// What a construction run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConstructionReport {
    pub journals: usize,
    pub documents: usize,
    pub positions_bytes: u64,
    pub full: Option<FinalizeStats>,
    pub prio: Option<FinalizeStats>,
}

/// Writes the forward index, the positions store and both reverse tiers
/// into the staging directory of an [`IndexConfig`].
pub struct IndexConstructor {
    config: IndexConfig,
    rewriter: Arc<dyn DocIdRewriter>,
}

impl IndexConstructor {
    pub fn new(config: IndexConfig) -> Self {
        IndexConstructor {
            config,
            rewriter: Arc::new(IdentityRewriter),
        }
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn DocIdRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Build a generation from every journal in `journal_dir`.
    ///
    /// Returns `Ok(None)` when the directory holds no journals. On failure
    /// the staging directory is cleared so that nothing half built can be
    /// switched in.
    pub fn construct(&self, journal_dir: &Path) -> Result<Option<ConstructionReport>> {
        let journals = IndexJournal::find_all(journal_dir)?;
        if journals.is_empty() {
            warn!("No journals in {}, nothing to construct", journal_dir.display());
            return Ok(None);
        }

        let out = self.config.next_dir();
        fs::create_dir_all(&out)?;
        match self.build(&journals, &out) {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                error!("Index construction failed: {e}");
                for name in INDEX_FILES {
                    let _ = fs::remove_file(out.join(name));
                }
                Err(e)
            }
        }
    }

    fn build(&self, journals: &[IndexJournal], out: &Path) -> Result<ConstructionReport> {
        let work_dir = self.config.work_dir();
        let rewriter = self.rewriter.as_ref();
        info!(
            "Constructing index from {} journals into {}",
            journals.len(),
            out.display()
        );

        let documents = ForwardIndexConverter::new(rewriter, out)
            .convert(journals)?
            .unwrap_or(0);

        let positions = PositionsWriter::create(out.join(POSITIONS_FILE))?;
        let full = ReverseIndexConstructor::new(
            FULL_TIER,
            out.join(REV_FULL_DOCS),
            out.join(REV_FULL_WORDS),
            work_dir.clone(),
        )
        .with_threads(self.config.construction_threads)
        .create_reverse_index(journals, rewriter, &FullTierEncoder::new(&positions))?;
        let positions_bytes = positions.finish()?;

        let prio = ReverseIndexConstructor::new(
            PRIORITY_TIER,
            out.join(REV_PRIO_DOCS),
            out.join(REV_PRIO_WORDS),
            work_dir,
        )
        .with_threads(self.config.construction_threads)
        .create_reverse_index(
            journals,
            rewriter,
            &PriorityTierEncoder::new(self.config.priority_term_flags),
        )?;

        Ok(ConstructionReport {
            journals: journals.len(),
            documents,
            positions_bytes,
            full,
            prio,
        })
    }
}
