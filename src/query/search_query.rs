//! The structured query handed to execution.

use serde::{Deserialize, Serialize};

use crate::query::QueryParams;

/// Include and exclude term ids plus parameter constraints.
///
/// Term lists are kept sorted and distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub includes: Vec<u64>,
    #[serde(default)]
    pub excludes: Vec<u64>,
    #[serde(default)]
    pub params: QueryParams,
}

impl SearchQuery {
    pub fn new(mut includes: Vec<u64>, mut excludes: Vec<u64>) -> Self {
        includes.sort_unstable();
        includes.dedup();
        excludes.sort_unstable();
        excludes.dedup();
        SearchQuery {
            includes,
            excludes,
            params: QueryParams::default(),
        }
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// A query without include terms produces no results.
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty()
    }
}
