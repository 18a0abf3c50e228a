//! Math verification: answer extraction, majority voting, and equivalence
//! checking.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::data::{SelfPlayItem, TestOutcome};
use crate::error::VerifyError;

use super::extract::extract_final_answer;

/// Extracts the final answer token from a completion.
pub trait AnswerExtractor: Send + Sync {
    fn extract(&self, completion: &str) -> Option<String>;
}

/// Default extractor: last `\boxed{...}` span in the post-`</think>` suffix,
/// falling back to the last non-empty line.
#[derive(Debug, Clone, Default)]
pub struct BoxedAnswerExtractor;

impl AnswerExtractor for BoxedAnswerExtractor {
    fn extract(&self, completion: &str) -> Option<String> {
        extract_final_answer(completion)
    }
}

/// Decides whether two answer strings denote the same value.
pub trait EquivalenceChecker: Send + Sync {
    fn equivalent(&self, a: &str, b: &str) -> bool;
}

/// Default predicate: numeric comparison when both sides parse as a decimal
/// or a `p/q` fraction, otherwise normalized string equality.
#[derive(Debug, Clone, Default)]
pub struct NumericEquivalence;

impl NumericEquivalence {
    fn parse_number(s: &str) -> Option<f64> {
        let s = s.trim().trim_start_matches('$').trim_end_matches('$').trim();
        if let Some((num, den)) = s.split_once('/') {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            return Some(num / den);
        }
        // LaTeX fractions are common in boxed answers.
        if let Some(rest) = s.strip_prefix("\\frac{") {
            let (num, rest) = rest.split_once('}')?;
            let den = rest.strip_prefix('{')?.strip_suffix('}')?;
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            return Some(num / den);
        }
        s.replace(',', "").parse().ok()
    }

    fn normalize(s: &str) -> String {
        s.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl EquivalenceChecker for NumericEquivalence {
    fn equivalent(&self, a: &str, b: &str) -> bool {
        match (Self::parse_number(a), Self::parse_number(b)) {
            (Some(x), Some(y)) => (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(1.0),
            _ => Self::normalize(a) == Self::normalize(b),
        }
    }
}

/// Verifier that scores completions against a reference or voted answer.
pub struct MathVerifier {
    /// Per-completion wall-clock bound on the equivalence check.
    check_timeout: Duration,
    extractor: Arc<dyn AnswerExtractor>,
    checker: Arc<dyn EquivalenceChecker>,
}

impl Default for MathVerifier {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(30),
            extractor: Arc::new(BoxedAnswerExtractor),
            checker: Arc::new(NumericEquivalence),
        }
    }
}

impl MathVerifier {
    /// Creates a verifier with the default 30s per-check timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-completion check timeout.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Replaces the answer extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn AnswerExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replaces the equivalence predicate.
    pub fn with_checker(mut self, checker: Arc<dyn EquivalenceChecker>) -> Self {
        self.checker = checker;
        self
    }

    /// Verifies one item in place. A no-op when the item is already solved.
    ///
    /// With a reference answer, each completion is scored directly against
    /// it. Without one, extracted answers are bucketed by equivalence and
    /// the largest bucket's representative becomes the voted answer; when no
    /// completion yields an extractable answer the item fails with empty
    /// `test_results`.
    pub async fn verify_item(&self, item: &mut SelfPlayItem) -> Result<(), VerifyError> {
        if item.solved {
            return Ok(());
        }
        if item.completions.is_empty() {
            return Ok(());
        }

        let extracted: Vec<Option<String>> = item
            .completions
            .iter()
            .map(|c| self.extractor.extract(c))
            .collect();

        let reference = match &item.answer {
            Some(answer) => answer.clone(),
            None => match self.vote(&extracted) {
                Some(voted) => voted,
                None => {
                    debug!(id = item.display_id(), "no extractable answer in any completion");
                    item.test_results = Vec::new();
                    item.solved = false;
                    return Ok(());
                }
            },
        };

        let mut results = Vec::with_capacity(extracted.len());
        for answer in &extracted {
            let outcome = match answer {
                None => TestOutcome::Fail,
                Some(answer) => self.check_with_timeout(answer, &reference).await,
            };
            results.push(outcome);
        }

        item.test_results = results;
        item.solved = item.test_results.iter().any(|r| r.is_pass());
        Ok(())
    }

    /// Buckets extracted answers by equivalence and returns the largest
    /// bucket's representative. The first-seen representative wins ties.
    fn vote(&self, extracted: &[Option<String>]) -> Option<String> {
        let mut buckets: Vec<(String, usize)> = Vec::new();
        for answer in extracted.iter().flatten() {
            match buckets
                .iter_mut()
                .find(|(rep, _)| self.checker.equivalent(rep, answer))
            {
                Some((_, count)) => *count += 1,
                None => buckets.push((answer.clone(), 1)),
            }
        }
        buckets
            .into_iter()
            .fold(None, |best: Option<(String, usize)>, candidate| match best {
                // Strict comparison keeps the earlier bucket on ties.
                Some(ref b) if b.1 >= candidate.1 => best,
                _ => Some(candidate),
            })
            .map(|(rep, _)| rep)
    }

    /// Runs the equivalence predicate under the per-completion wall clock.
    /// A breach records `timeout`, retained verbatim for diagnostics.
    async fn check_with_timeout(&self, answer: &str, reference: &str) -> TestOutcome {
        let checker = Arc::clone(&self.checker);
        let answer = answer.to_string();
        let reference = reference.to_string();

        let task = tokio::task::spawn_blocking(move || checker.equivalent(&answer, &reference));
        match timeout(self.check_timeout, task).await {
            Ok(Ok(true)) => TestOutcome::Pass,
            Ok(Ok(false)) => TestOutcome::Fail,
            Ok(Err(e)) => {
                warn!("equivalence check panicked: {e}");
                TestOutcome::Fail
            }
            Err(_) => TestOutcome::Timeout,
        }
    }
}
