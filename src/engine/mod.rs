//! Inference engine seam.
//!
//! The LLM runtime is an opaque batched-generation service. Drivers talk to
//! it through [`CompletionEngine`], so tests run against an in-process fake
//! while production workers launch and query a vLLM-compatible server.

mod config;
mod mock;
mod vllm;

use async_trait::async_trait;

use crate::error::InferenceError;

pub use config::{EngineConfig, RopeScaling, SamplingParams};
pub use mock::FnEngine;
pub use vllm::{VllmEngine, VllmServer};

/// A batched text-completion service.
///
/// `complete` returns exactly one completion per prompt, in prompt order.
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    async fn complete(
        &self,
        prompts: &[String],
        params: &SamplingParams,
    ) -> Result<Vec<String>, InferenceError>;
}
