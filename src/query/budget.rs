//! Search budget: the deadline for pulling more postings.

use std::time::{Duration, Instant};

/// A deadline checked cooperatively between buffer fills.
///
/// Running out of budget is not an error; execution simply stops producing
/// results and returns what it has.
#[derive(Debug, Clone, Copy)]
pub struct SearchBudget {
    start: Instant,
    limit: Duration,
}

impl SearchBudget {
    pub fn new(limit: Duration) -> Self {
        SearchBudget {
            start: Instant::now(),
            limit,
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// A budget that effectively never runs out.
    pub fn unlimited() -> Self {
        Self::new(Duration::from_secs(60 * 60 * 24 * 365))
    }

    pub fn has_time_left(&self) -> bool {
        self.start.elapsed() < self.limit
    }

    pub fn time_left(&self) -> Duration {
        self.limit.saturating_sub(self.start.elapsed())
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_expires() {
        let budget = SearchBudget::from_millis(20);
        assert!(budget.has_time_left());
        std::thread::sleep(Duration::from_millis(30));
        assert!(!budget.has_time_left());
        assert_eq!(budget.time_left(), Duration::ZERO);
    }

    #[test]
    fn test_unlimited() {
        let budget = SearchBudget::unlimited();
        assert!(budget.has_time_left());
        assert!(budget.time_left() > Duration::from_secs(3600));
    }
}
