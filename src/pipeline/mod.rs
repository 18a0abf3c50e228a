//! End-to-end orchestration: sample, synthesize, judge, self-play, verify.
//!
//! Each stage persists its output as JSONL under the run's output directory
//! and resumes from disk when rerun.

pub mod config;
pub mod runner;

pub use config::{PipelineConfig, DEBUG_CAP};
pub use runner::{PipelineRunner, RunSummary};
