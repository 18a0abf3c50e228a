//! Deterministic in-process engine for tests and dry runs.

use async_trait::async_trait;

use crate::error::InferenceError;

use super::{CompletionEngine, SamplingParams};

/// Engine that computes each completion from its prompt with a closure.
///
/// Useful for exercising drivers without a GPU runtime: tests assert on
/// ordering and bookkeeping while the closure fabricates model output.
pub struct FnEngine<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    f: F,
}

impl<F> FnEngine<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    /// Wraps a prompt-to-completion closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> CompletionEngine for FnEngine<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    async fn complete(
        &self,
        prompts: &[String],
        params: &SamplingParams,
    ) -> Result<Vec<String>, InferenceError> {
        params.validate()?;
        Ok(prompts.iter().map(|p| (self.f)(p)).collect())
    }
}
