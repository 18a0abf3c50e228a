//! Code verification: run extracted candidate programs against I/O test
//! cases in sandboxed subprocesses.

use std::io::Write as _;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::data::{SelfPlayItem, TestCase, TestOutcome};
use crate::error::VerifyError;

use super::extract::extract_code_block;

/// Error code recorded when the global per-item wall-clock budget is hit.
pub const BUDGET_BREACH_CODE: i32 = -3;

/// Slack added to the global per-item budget.
const BUDGET_EPSILON: Duration = Duration::from_secs(5);

/// Compares captured stdout against the expected output.
///
/// Normalization rules (whitespace, numeric tolerance) live here, not in the
/// verifier.
pub trait OutputComparator: Send + Sync {
    fn matches(&self, expected: &str, actual: &str) -> bool;
}

/// Token-wise comparator: splits both sides on whitespace and compares token
/// by token, treating numeric tokens as equal within a small relative
/// tolerance.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceComparator;

impl OutputComparator for WhitespaceComparator {
    fn matches(&self, expected: &str, actual: &str) -> bool {
        let expected: Vec<&str> = expected.split_whitespace().collect();
        let actual: Vec<&str> = actual.split_whitespace().collect();
        if expected.len() != actual.len() {
            return false;
        }
        expected.iter().zip(&actual).all(|(e, a)| {
            if e == a {
                return true;
            }
            match (e.parse::<f64>(), a.parse::<f64>()) {
                (Ok(x), Ok(y)) => (x - y).abs() <= 1e-6 * x.abs().max(y.abs()).max(1.0),
                _ => false,
            }
        })
    }
}

/// Verifier that executes candidate programs against test cases.
pub struct CodeVerifier {
    /// Per-test-case wall-clock timeout.
    case_timeout: Duration,
    comparator: Arc<dyn OutputComparator>,
    /// Interpreter used to run candidates.
    interpreter: String,
}

impl Default for CodeVerifier {
    fn default() -> Self {
        Self {
            case_timeout: Duration::from_secs(30),
            comparator: Arc::new(WhitespaceComparator),
            interpreter: "python3".to_string(),
        }
    }
}

impl CodeVerifier {
    /// Creates a verifier with the default 30s per-case timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-test-case timeout.
    pub fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = timeout;
        self
    }

    /// Replaces the output comparator.
    pub fn with_comparator(mut self, comparator: Arc<dyn OutputComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Verifies one item in place. A no-op when the item is already solved.
    ///
    /// One outcome is recorded per completion; the item solves iff any
    /// completion passes every test case. If the global per-item budget of
    /// `(case_timeout + 1s) * num_cases + epsilon` is breached, remaining
    /// work is killed, every completion records a timeout, and
    /// `error_code = -3` is set.
    pub async fn verify_item(&self, item: &mut SelfPlayItem) -> Result<(), VerifyError> {
        if item.solved {
            return Ok(());
        }
        let cases = item.test_cases.clone().unwrap_or_default();
        if item.completions.is_empty() || cases.is_empty() {
            return Ok(());
        }

        let per_case = self.case_timeout + Duration::from_secs(1);
        let budget = per_case * cases.len() as u32 + BUDGET_EPSILON;

        let completions = item.completions.clone();
        match timeout(budget, self.check_completions(&completions, &cases)).await {
            Ok(results) => {
                item.test_results = results?;
                item.solved = item.test_results.iter().any(|r| r.is_pass());
            }
            Err(_) => {
                warn!(id = item.display_id(), "per-item verification budget breached");
                item.test_results = vec![TestOutcome::Timeout; item.completions.len()];
                item.error_code = Some(BUDGET_BREACH_CODE);
                item.solved = false;
            }
        }
        Ok(())
    }

    async fn check_completions(
        &self,
        completions: &[String],
        cases: &[TestCase],
    ) -> Result<Vec<TestOutcome>, VerifyError> {
        let mut results = Vec::with_capacity(completions.len());
        for completion in completions {
            results.push(self.check_completion(completion, cases).await?);
        }
        Ok(results)
    }

    /// Checks one completion: pass iff every test case passes. Stops at the
    /// first non-pass case.
    async fn check_completion(
        &self,
        completion: &str,
        cases: &[TestCase],
    ) -> Result<TestOutcome, VerifyError> {
        let Some(code) = extract_code_block(completion) else {
            return Ok(TestOutcome::Fail);
        };

        let mut program = tempfile::Builder::new()
            .prefix("promptforge-candidate-")
            .suffix(".py")
            .tempfile()
            .map_err(|e| VerifyError::Sandbox(e.to_string()))?;
        program
            .write_all(code.as_bytes())
            .map_err(|e| VerifyError::Sandbox(e.to_string()))?;
        program
            .flush()
            .map_err(|e| VerifyError::Sandbox(e.to_string()))?;

        for case in cases {
            let outcome = self.run_case(program.path(), case).await;
            if !outcome.is_pass() {
                return Ok(outcome);
            }
        }
        Ok(TestOutcome::Pass)
    }

    /// Runs one test case in a subprocess. Spawn failures and non-zero exits
    /// flatten to `Fail`; only the wall clock produces `Timeout`.
    async fn run_case(&self, program: &Path, case: &TestCase) -> TestOutcome {
        let child = tokio::process::Command::new(&self.interpreter)
            .arg(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("sandbox spawn failed: {e}");
                return TestOutcome::Fail;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(case.input.as_bytes()).await.is_err() {
                return TestOutcome::Fail;
            }
            // Close stdin so programs reading to EOF terminate.
            drop(stdin);
        }

        // kill_on_drop reaps the subprocess when the timeout drops the
        // wait future.
        match timeout(self.case_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    return TestOutcome::Fail;
                }
                let stdout = String::from_utf8_lossy(&output.stdout);
                if self.comparator.matches(&case.output, &stdout) {
                    TestOutcome::Pass
                } else {
                    debug!(expected = %case.output, actual = %stdout, "output mismatch");
                    TestOutcome::Fail
                }
            }
            Ok(Err(e)) => {
                warn!("sandbox wait failed: {e}");
                TestOutcome::Fail
            }
            Err(_) => TestOutcome::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python3_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok()
    }

    fn code_item(completion: &str) -> SelfPlayItem {
        let mut item = SelfPlayItem::new("sum two ints");
        item.test_cases = Some(vec![TestCase {
            input: "1 2\n".to_string(),
            output: "3\n".to_string(),
        }]);
        item.completions = vec![completion.to_string()];
        item
    }

    #[test]
    fn comparator_normalizes_whitespace_and_numbers() {
        let cmp = WhitespaceComparator;
        assert!(cmp.matches("3\n", "3"));
        assert!(cmp.matches("1 2 3", " 1  2\n3 "));
        assert!(cmp.matches("0.5", "0.5000000001"));
        assert!(!cmp.matches("3", "4"));
        assert!(!cmp.matches("1 2", "1"));
    }

    #[tokio::test]
    async fn passing_program_solves_the_item() {
        if !python3_available() {
            eprintln!("python3 not available; skipping");
            return;
        }
        let verifier = CodeVerifier::new();
        let mut item = code_item(
            "Solution:\n```python\ndef solve(): print(sum(map(int, input().split())))\nsolve()\n```",
        );
        verifier.verify_item(&mut item).await.unwrap();
        assert!(item.solved);
        assert_eq!(item.test_results, vec![TestOutcome::Pass]);
    }

    #[tokio::test]
    async fn wrong_output_fails() {
        if !python3_available() {
            eprintln!("python3 not available; skipping");
            return;
        }
        let verifier = CodeVerifier::new();
        let mut item = code_item("```python\nprint(99)\n```");
        verifier.verify_item(&mut item).await.unwrap();
        assert!(!item.solved);
        assert_eq!(item.test_results, vec![TestOutcome::Fail]);
    }

    #[tokio::test]
    async fn infinite_loop_times_out_within_budget() {
        if !python3_available() {
            eprintln!("python3 not available; skipping");
            return;
        }
        let verifier = CodeVerifier::new().with_case_timeout(Duration::from_secs(2));
        let mut item = code_item("```python\nwhile True: pass\n```");

        let start = std::time::Instant::now();
        verifier.verify_item(&mut item).await.unwrap();
        assert!(!item.solved);
        assert!(matches!(
            item.test_results[0],
            TestOutcome::Timeout | TestOutcome::Fail
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn completion_without_fences_fails() {
        let verifier = CodeVerifier::new();
        let mut item = code_item("no code here");
        verifier.verify_item(&mut item).await.unwrap();
        assert!(!item.solved);
        assert_eq!(item.test_results, vec![TestOutcome::Fail]);
    }

    #[tokio::test]
    async fn solved_items_are_untouched() {
        let verifier = CodeVerifier::new();
        let mut item = code_item("```python\nprint(0)\n```");
        item.solved = true;
        item.test_results = vec![TestOutcome::Pass];

        verifier.verify_item(&mut item).await.unwrap();
        assert!(item.solved);
        assert_eq!(item.test_results, vec![TestOutcome::Pass]);
    }
}
