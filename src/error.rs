//! Error types for promptforge operations.
//!
//! Defines error types for all major subsystems:
//! - Concept store construction and lookup
//! - Nearest-neighbor queries
//! - Concept tuple sampling
//! - JSONL data loading and validation
//! - Batched and self-play inference
//! - Code and math verification

use thiserror::Error;

/// Errors that can occur while building or querying the concept store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing embedding for concept '{0}' observed in seed lists")]
    MissingEmbedding(String),

    #[error("Invalid embedding for concept '{concept}': {reason}")]
    InvalidEmbedding { concept: String, reason: String },

    #[error("No seed concept lists supplied")]
    EmptySeedLists,
}

/// Errors that can occur during nearest-neighbor index queries.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid query vector: {0}")]
    InvalidQuery(String),
}

/// Errors that can occur during concept tuple sampling.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("Temperature must be strictly positive, got {0}")]
    InvalidTemperature(f64),

    #[error("Requested tuple of size {requested} but only {available} concepts are available")]
    InsufficientConcepts { requested: usize, available: usize },

    #[error("Seed concept '{0}' is not in the concept store")]
    UnknownSeedConcept(String),

    #[error("Degenerate scores during sampling: {0}")]
    InvalidEmbedding(String),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Errors that can occur while reading, writing, or validating JSONL data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Malformed JSONL at {path}:{line}: {source}")]
    MalformedJsonl {
        path: String,
        line: usize,
        source: serde_json::Error,
    },

    #[error("Item '{0}' has source 'PromptCoT-Math' but no reference answer")]
    MissingReferenceAnswer(String),

    #[error("Code item '{0}' has no test cases")]
    MissingTestCases(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during batched or self-play inference.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Invalid sampling configuration: {0}")]
    InvalidSampling(String),

    #[error("Cannot partition {n_gpus} GPUs across {n_splits} splits: GPU count must be divisible by split count")]
    InvalidGpuPartition { n_gpus: usize, n_splits: usize },

    #[error("Worker for split {split_id} failed: {message}")]
    WorkerFailed { split_id: usize, message: String },

    #[error("Inference engine error: {0}")]
    Engine(String),

    #[error("Engine returned {got} completions for {expected} prompts")]
    CompletionCountMismatch { expected: usize, got: usize },

    #[error("Engine did not become ready within {0:?}")]
    EngineStartupTimeout(std::time::Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during verification.
///
/// Per-test-case outcomes (pass, fail, timeout) are recorded in the item and
/// are not errors; this type covers environment-level failures only.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Sandbox setup failed: {0}")]
    Sandbox(String),

    #[error("Verifier task panicked: {0}")]
    TaskFailed(String),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the top-level pipeline driver.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Concept store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
