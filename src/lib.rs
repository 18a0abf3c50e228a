//! promptforge: concept-guided synthesis of verified reasoning problems.
//!
//! This library samples concept tuples from a co-occurrence-and-embedding
//! store, composes generation and judgement prompts, drives a local
//! inference runtime across GPU-partitioned worker processes, and verifies
//! self-play completions against test cases or reference answers.

// Core modules
pub mod cli;
pub mod concepts;
pub mod data;
pub mod engine;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod prompts;
pub mod verify;

// Re-export commonly used error types
pub use error::{
    DataError, IndexError, InferenceError, PipelineError, SamplerError, StoreError, VerifyError,
};
