//! Document parameter constraints checked against forward index metadata.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::forward::ForwardIndexReader;
use crate::model::{DocIdCodec, DocumentMetadata};
use crate::query::{QueryBuffer, QueryFilterStep};

/// A bound on one numeric document property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SpecificationLimit {
    #[default]
    None,
    Equals(i32),
    /// Inclusive upper bound.
    LessThan(i32),
    /// Inclusive lower bound.
    GreaterThan(i32),
}

impl SpecificationLimit {
    pub fn is_none(&self) -> bool {
        matches!(self, SpecificationLimit::None)
    }

    pub fn test(&self, parameter: i32) -> bool {
        match *self {
            SpecificationLimit::None => true,
            SpecificationLimit::Equals(value) => parameter == value,
            SpecificationLimit::LessThan(value) => parameter <= value,
            SpecificationLimit::GreaterThan(value) => parameter >= value,
        }
    }
}

/// Field constraints of a search query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    /// Admitted domain ids; empty admits every domain.
    pub domains: Vec<u32>,
    pub quality: SpecificationLimit,
    pub year: SpecificationLimit,
    pub size: SpecificationLimit,
    pub rank: SpecificationLimit,
}

impl QueryParams {
    /// True when no constraint is set and every document passes.
    pub fn is_unconstrained(&self) -> bool {
        self.domains.is_empty()
            && self.quality.is_none()
            && self.year.is_none()
            && self.size.is_none()
            && self.rank.is_none()
    }

    /// Test a combined document id with its metadata long.
    pub fn test(&self, combined_id: u64, doc_meta: u64) -> bool {
        if !self.domains.is_empty() {
            let domain = DocIdCodec::domain_id(combined_id);
            if !self.domains.contains(&domain) {
                return false;
            }
        }
        if self.quality.is_none() && self.year.is_none() && self.size.is_none() && self.rank.is_none()
        {
            return true;
        }

        let meta = DocumentMetadata::decode(doc_meta);
        self.quality.test(meta.quality as i32)
            && self.year.test(meta.year as i32)
            && self.size.test(meta.size as i32)
            && self.rank.test(meta.rank as i32)
    }
}

/// Filter step checking [`QueryParams`] against the forward index.
pub struct ParamMatchingFilter {
    params: QueryParams,
    forward: Arc<ForwardIndexReader>,
}

impl ParamMatchingFilter {
    pub fn new(params: QueryParams, forward: Arc<ForwardIndexReader>) -> Self {
        ParamMatchingFilter { params, forward }
    }
}

impl QueryFilterStep for ParamMatchingFilter {
    fn apply(&self, buffer: &mut QueryBuffer) {
        if self.params.is_unconstrained() {
            return;
        }
        buffer.retain_where(|id| self.params.test(id, self.forward.doc_meta(id)));
    }

    fn cost(&self) -> f64 {
        32.0
    }

    fn describe(&self) -> String {
        "[ParamMatching]".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specification_limits() {
        assert!(SpecificationLimit::None.test(-5));
        assert!(SpecificationLimit::Equals(3).test(3));
        assert!(!SpecificationLimit::Equals(3).test(4));
        assert!(SpecificationLimit::LessThan(10).test(10));
        assert!(!SpecificationLimit::LessThan(10).test(11));
        assert!(SpecificationLimit::GreaterThan(2000).test(2010));
        assert!(!SpecificationLimit::GreaterThan(2000).test(1999));
    }

    #[test]
    fn test_params_against_metadata() {
        let id = DocIdCodec::encode(3, 42, 7);
        let meta = DocumentMetadata {
            rank: 3,
            year: 2015,
            size: 400,
            quality: 12,
            flags: 0,
        }
        .encode();

        let mut params = QueryParams::default();
        assert!(params.is_unconstrained());
        assert!(params.test(id, meta));

        params.domains = vec![41];
        assert!(!params.test(id, meta));
        params.domains.push(42);
        assert!(params.test(id, meta));

        params.year = SpecificationLimit::GreaterThan(2016);
        assert!(!params.test(id, meta));
        params.year = SpecificationLimit::LessThan(2015);
        params.quality = SpecificationLimit::Equals(12);
        assert!(params.test(id, meta));
    }

    #[test]
    fn test_params_json() {
        let params: QueryParams =
            serde_json::from_str(r#"{"domains":[1],"year":{"type":"greater_than","value":2000}}"#)
                .unwrap();
        assert_eq!(params.domains, vec![1]);
        assert_eq!(params.year, SpecificationLimit::GreaterThan(2000));
        assert!(params.size.is_none());
    }
}
