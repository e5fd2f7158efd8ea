//! Query filter steps: in-place predicates over a candidate buffer.

use std::fmt;

use crate::query::QueryBuffer;

/// One filtering step of an [`IndexQuery`](crate::query::IndexQuery).
pub trait QueryFilterStep: Send + Sync {
    /// Remove the candidates that do not pass, keeping the rest in order.
    fn apply(&self, buffer: &mut QueryBuffer);

    /// Relative cost estimate; cheaper steps run first inside [`AllOf`].
    fn cost(&self) -> f64;

    fn describe(&self) -> String;
}

impl fmt::Debug for dyn QueryFilterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Keeps everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct LetThrough;

impl QueryFilterStep for LetThrough {
    fn apply(&self, buffer: &mut QueryBuffer) {
        buffer.retain_all_remaining();
        buffer.finalize();
    }

    fn cost(&self) -> f64 {
        0.0
    }

    fn describe(&self) -> String {
        "[PassThrough]".to_string()
    }
}

/// Rejects everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPass;

impl QueryFilterStep for NoPass {
    fn apply(&self, buffer: &mut QueryBuffer) {
        buffer.reject_all_remaining();
        buffer.finalize();
    }

    fn cost(&self) -> f64 {
        0.0
    }

    fn describe(&self) -> String {
        "[NoPass]".to_string()
    }
}

/// Keeps candidates passing every step. Steps run cheapest first.
pub struct AllOf {
    steps: Vec<Box<dyn QueryFilterStep>>,
}

impl AllOf {
    pub fn new(mut steps: Vec<Box<dyn QueryFilterStep>>) -> Self {
        steps.sort_by(|a, b| a.cost().total_cmp(&b.cost()));
        AllOf { steps }
    }
}

impl QueryFilterStep for AllOf {
    fn apply(&self, buffer: &mut QueryBuffer) {
        for step in &self.steps {
            if buffer.is_empty() {
                break;
            }
            step.apply(buffer);
        }
    }

    fn cost(&self) -> f64 {
        self.steps.iter().map(|s| s.cost()).sum()
    }

    fn describe(&self) -> String {
        let inner: Vec<String> = self.steps.iter().map(|s| s.describe()).collect();
        format!("AllOf[{}]", inner.join(","))
    }
}

/// Keeps candidates passing at least one step. With no steps nothing passes.
pub struct AnyOf {
    steps: Vec<Box<dyn QueryFilterStep>>,
}

impl AnyOf {
    pub fn new(steps: Vec<Box<dyn QueryFilterStep>>) -> Self {
        AnyOf { steps }
    }
}

impl QueryFilterStep for AnyOf {
    fn apply(&self, buffer: &mut QueryBuffer) {
        let candidates = buffer.values().to_vec();
        let mut keep = vec![false; candidates.len()];

        for step in &self.steps {
            let mut copy = QueryBuffer::from_values(&candidates);
            step.apply(&mut copy);

            // Both lists are ascending; mark the survivors.
            let mut i = 0;
            for &value in copy.values() {
                while i < candidates.len() && candidates[i] < value {
                    i += 1;
                }
                if i < candidates.len() && candidates[i] == value {
                    keep[i] = true;
                }
            }
        }

        let mut i = 0;
        while buffer.has_more() {
            if keep[i] {
                buffer.retain_and_advance();
            } else {
                buffer.reject_and_advance();
            }
            i += 1;
        }
        buffer.finalize();
    }

    fn cost(&self) -> f64 {
        self.steps.iter().map(|s| s.cost()).sum()
    }

    fn describe(&self) -> String {
        let inner: Vec<String> = self.steps.iter().map(|s| s.describe()).collect();
        format!("AnyOf[{}]", inner.join(","))
    }
}

/// Keeps candidates for which a closure returns true.
pub struct Predicate<F> {
    name: String,
    test: F,
    cost: f64,
}

impl<F> Predicate<F>
where
    F: Fn(u64) -> bool + Send + Sync,
{
    pub fn new<S: Into<String>>(name: S, cost: f64, test: F) -> Self {
        Predicate {
            name: name.into(),
            test,
            cost,
        }
    }
}

impl<F> QueryFilterStep for Predicate<F>
where
    F: Fn(u64) -> bool + Send + Sync,
{
    fn apply(&self, buffer: &mut QueryBuffer) {
        buffer.retain_where(&self.test);
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn describe(&self) -> String {
        format!("[Predicate {}]", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even() -> Box<dyn QueryFilterStep> {
        Box::new(Predicate::new("even", 1.0, |v| v % 2 == 0))
    }

    fn div3() -> Box<dyn QueryFilterStep> {
        Box::new(Predicate::new("div3", 2.0, |v| v % 3 == 0))
    }

    fn run(step: &dyn QueryFilterStep) -> Vec<u64> {
        let mut buffer = QueryBuffer::from_values(&(1..=12).collect::<Vec<_>>());
        step.apply(&mut buffer);
        buffer.values().to_vec()
    }

    #[test]
    fn test_trivial_steps() {
        assert_eq!(run(&LetThrough).len(), 12);
        assert!(run(&NoPass).is_empty());
    }

    #[test]
    fn test_all_of() {
        let step = AllOf::new(vec![div3(), even()]);
        assert_eq!(run(&step), vec![6, 12]);
        assert_eq!(step.describe(), "AllOf[[Predicate even],[Predicate div3]]");
    }

    #[test]
    fn test_any_of() {
        let step = AnyOf::new(vec![even(), div3()]);
        assert_eq!(run(&step), vec![2, 3, 4, 6, 8, 9, 10, 12]);
        assert!(run(&AnyOf::new(vec![])).is_empty());
    }
}
