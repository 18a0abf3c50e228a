//! Pipeline configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::data::EvalType;
use crate::engine::SamplingParams;

/// Number of items a debug run is capped at.
pub const DEBUG_CAP: usize = 8;

/// End-to-end pipeline configuration.
///
/// Stage outputs land under `output_dir` as one JSONL file per stage; a rerun
/// over the same directory resumes from the last completed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of concept tuples to sample, one problem candidate each.
    pub num_problems: usize,
    /// Concepts per tuple.
    pub tuple_size: usize,
    /// Softmax temperature for tuple extension.
    pub tau: f64,
    /// Target difficulty label woven into prompts.
    pub difficulty: String,
    /// Self-play completion target per item.
    pub num_completions: usize,
    /// Sampling parameters for every inference stage.
    pub sampling: SamplingParams,
    /// Verification mode for self-play items.
    pub eval_type: EvalType,
    /// Concurrent verification workers.
    pub num_workers: usize,
    /// Sampler seed (None = non-deterministic).
    pub seed: Option<u64>,
    /// Directory holding stage outputs.
    pub output_dir: PathBuf,
    /// Caps the run at [`DEBUG_CAP`] items for quick iteration.
    pub debug: bool,
}

impl PipelineConfig {
    /// Creates a config with defaults suitable for a small run.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            num_problems: 100,
            tuple_size: 5,
            tau: 1.0,
            difficulty: "olympiad".to_string(),
            num_completions: 4,
            sampling: SamplingParams::default(),
            eval_type: EvalType::Math,
            num_workers: 4,
            seed: None,
            output_dir: output_dir.into(),
            debug: false,
        }
    }

    pub fn with_num_problems(mut self, num_problems: usize) -> Self {
        self.num_problems = num_problems;
        self
    }

    pub fn with_tuple_size(mut self, tuple_size: usize) -> Self {
        self.tuple_size = tuple_size;
        self
    }

    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = difficulty.into();
        self
    }

    pub fn with_num_completions(mut self, num_completions: usize) -> Self {
        self.num_completions = num_completions;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_eval_type(mut self, eval_type: EvalType) -> Self {
        self.eval_type = eval_type;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Effective item count after the debug cap.
    pub fn effective_num_problems(&self) -> usize {
        if self.debug {
            self.num_problems.min(DEBUG_CAP)
        } else {
            self.num_problems
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_caps_item_count() {
        let config = PipelineConfig::new("/tmp/out").with_num_problems(1000);
        assert_eq!(config.effective_num_problems(), 1000);
        assert_eq!(config.with_debug(true).effective_num_problems(), DEBUG_CAP);
    }

    #[test]
    fn builders_compose() {
        let config = PipelineConfig::new("/tmp/out")
            .with_tuple_size(3)
            .with_tau(0.5)
            .with_difficulty("intermediate")
            .with_seed(7);
        assert_eq!(config.tuple_size, 3);
        assert_eq!(config.tau, 0.5);
        assert_eq!(config.difficulty, "intermediate");
        assert_eq!(config.seed, Some(7));
    }
}
