//! Verification of self-play completions.
//!
//! Code items run against their I/O test cases in sandboxed subprocesses;
//! math items are scored against a reference answer or a majority vote over
//! extracted answers. [`Verifier`] fans items out over a bounded pool of
//! concurrent tasks and reassembles results in input order.

pub mod code;
pub mod extract;
pub mod math;

pub use code::{CodeVerifier, OutputComparator, WhitespaceComparator, BUDGET_BREACH_CODE};
pub use extract::{extract_code_block, extract_final_answer, strip_think};
pub use math::{
    AnswerExtractor, BoxedAnswerExtractor, EquivalenceChecker, MathVerifier, NumericEquivalence,
};

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::info;

use crate::data::{EvalType, SelfPlayItem};
use crate::error::VerifyError;

const DEFAULT_NUM_WORKERS: usize = 4;

/// Dispatches items to the code or math verifier with bounded concurrency.
pub struct Verifier {
    eval_type: EvalType,
    code: Arc<CodeVerifier>,
    math: Arc<MathVerifier>,
    num_workers: usize,
}

impl Verifier {
    /// Creates a verifier for the given evaluation type with default
    /// sub-verifiers and 4 concurrent workers.
    pub fn new(eval_type: EvalType) -> Self {
        Self {
            eval_type,
            code: Arc::new(CodeVerifier::new()),
            math: Arc::new(MathVerifier::new()),
            num_workers: DEFAULT_NUM_WORKERS,
        }
    }

    /// Sets the number of items verified concurrently.
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Replaces the code verifier.
    pub fn with_code_verifier(mut self, code: CodeVerifier) -> Self {
        self.code = Arc::new(code);
        self
    }

    /// Replaces the math verifier.
    pub fn with_math_verifier(mut self, math: MathVerifier) -> Self {
        self.math = Arc::new(math);
        self
    }

    /// Verifies every item, returning them in input order.
    pub async fn verify_all(
        &self,
        items: Vec<SelfPlayItem>,
    ) -> Result<Vec<SelfPlayItem>, VerifyError> {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.num_workers));
        let mut tasks = Vec::with_capacity(total);

        for (idx, mut item) in items.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let eval_type = self.eval_type;
            let code = Arc::clone(&self.code);
            let math = Arc::clone(&self.math);

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| VerifyError::TaskFailed(e.to_string()))?;
                match eval_type {
                    EvalType::Code => code.verify_item(&mut item).await?,
                    EvalType::Math => math.verify_item(&mut item).await?,
                }
                Ok::<(usize, SelfPlayItem), VerifyError>((idx, item))
            }));
        }

        let mut slots: Vec<Option<SelfPlayItem>> = (0..total).map(|_| None).collect();
        for joined in futures::future::join_all(tasks).await {
            let (idx, item) = joined.map_err(|e| VerifyError::TaskFailed(e.to_string()))??;
            slots[idx] = Some(item);
        }

        let verified: Vec<SelfPlayItem> = slots.into_iter().flatten().collect();
        let solved = verified.iter().filter(|item| item.solved).count();
        info!(total, solved, eval_type = %self.eval_type_name(), "verification complete");
        Ok(verified)
    }

    fn eval_type_name(&self) -> &'static str {
        match self.eval_type {
            EvalType::Code => "code",
            EvalType::Math => "math",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TestOutcome;

    fn math_item(answers: &[&str]) -> SelfPlayItem {
        let mut item = SelfPlayItem::new("q");
        item.completions = answers.iter().map(|a| format!("\\boxed{{{a}}}")).collect();
        item
    }

    #[tokio::test]
    async fn verify_all_preserves_order_under_concurrency() {
        let verifier = Verifier::new(EvalType::Math).with_num_workers(3);
        let items: Vec<SelfPlayItem> = (0..20)
            .map(|i| {
                let mut item = math_item(&["7", "7"]);
                item.prompt = format!("q{i}");
                item
            })
            .collect();

        let out = verifier.verify_all(items).await.unwrap();
        assert_eq!(out.len(), 20);
        for (i, item) in out.iter().enumerate() {
            assert_eq!(item.prompt, format!("q{i}"));
            assert!(item.solved);
        }
    }

    #[tokio::test]
    async fn math_dispatch_records_per_completion_outcomes() {
        let verifier = Verifier::new(EvalType::Math);
        let out = verifier
            .verify_all(vec![math_item(&["3", "3", "4"])])
            .await
            .unwrap();
        assert_eq!(
            out[0].test_results,
            vec![TestOutcome::Pass, TestOutcome::Pass, TestOutcome::Fail]
        );
    }

    #[tokio::test]
    async fn empty_input_is_fine() {
        let verifier = Verifier::new(EvalType::Code);
        let out = verifier.verify_all(Vec::new()).await.unwrap();
        assert!(out.is_empty());
    }
}
