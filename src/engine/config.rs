//! Engine launch and sampling configuration.

use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Yarn-style rope extension applied when the model must handle contexts
/// beyond its trained positional range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RopeScaling {
    /// Extension factor, must be greater than 1.
    pub factor: f64,
    /// Declared original max positional embedding count of the model.
    pub original_max_position_embeddings: u32,
}

/// Configuration for launching or connecting to the inference runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model checkpoint path or hub identifier.
    pub model_path: String,
    /// Tokenizer path; defaults to the model path when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<String>,
    /// Numeric precision, e.g. "bfloat16".
    pub dtype: String,
    /// Optional rope extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rope_scaling: Option<RopeScaling>,
}

impl EngineConfig {
    /// Creates a config with the given model path and bfloat16 precision.
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            tokenizer_path: None,
            dtype: "bfloat16".to_string(),
            rope_scaling: None,
        }
    }

    /// Sets the tokenizer path.
    pub fn with_tokenizer(mut self, path: impl Into<String>) -> Self {
        self.tokenizer_path = Some(path.into());
        self
    }

    /// Sets the numeric precision.
    pub fn with_dtype(mut self, dtype: impl Into<String>) -> Self {
        self.dtype = dtype.into();
        self
    }

    /// Applies a yarn rope extension.
    pub fn with_rope_scaling(mut self, factor: f64, original_max_position_embeddings: u32) -> Self {
        self.rope_scaling = Some(RopeScaling {
            factor,
            original_max_position_embeddings,
        });
        self
    }
}

/// Sampling configuration recognized at the driver boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature, non-negative.
    pub temperature: f64,
    /// Nucleus sampling mass, in (0, 1].
    pub top_p: f64,
    /// Top-k cutoff; -1 disables.
    pub top_k: i32,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub repetition_penalty: f64,
    /// Minimum completion length in tokens.
    pub min_len: u32,
    /// Maximum completion length in tokens.
    pub max_len: u32,
    /// Random seed; None means non-deterministic, each run independent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Wrap prompts with the model's configured chat template.
    #[serde(default)]
    pub use_chat_template: bool,
    /// Passed through to chat-template rendering when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            top_k: -1,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            repetition_penalty: 1.0,
            min_len: 0,
            max_len: 4096,
            seed: None,
            use_chat_template: false,
            reasoning_effort: None,
        }
    }
}

impl SamplingParams {
    /// Sets the temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the nucleus sampling mass.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the maximum completion length.
    pub fn with_max_len(mut self, max_len: u32) -> Self {
        self.max_len = max_len;
        self
    }

    /// Returns a copy with the seed shifted by `split_id`, so different
    /// splits explore different samples while remaining reproducible. A
    /// non-deterministic seed stays non-deterministic.
    pub fn for_split(&self, split_id: u64) -> Self {
        let mut params = self.clone();
        params.seed = self.seed.map(|s| s + split_id);
        params
    }

    /// Validates field ranges.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if !(self.temperature >= 0.0) {
            return Err(InferenceError::InvalidSampling(format!(
                "temperature must be >= 0, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(InferenceError::InvalidSampling(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if self.top_k != -1 && self.top_k < 1 {
            return Err(InferenceError::InvalidSampling(format!(
                "top_k must be -1 or >= 1, got {}",
                self.top_k
            )));
        }
        if self.min_len > self.max_len {
            return Err(InferenceError::InvalidSampling(format!(
                "min_len {} exceeds max_len {}",
                self.min_len, self.max_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SamplingParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(SamplingParams::default()
            .with_temperature(-0.1)
            .validate()
            .is_err());
        assert!(SamplingParams::default().with_top_p(0.0).validate().is_err());
        assert!(SamplingParams::default().with_top_p(1.5).validate().is_err());

        let mut params = SamplingParams::default();
        params.top_k = 0;
        assert!(params.validate().is_err());
        params.top_k = -1;
        assert!(params.validate().is_ok());

        let mut params = SamplingParams::default();
        params.min_len = 100;
        params.max_len = 10;
        assert!(params.validate().is_err());
    }

    #[test]
    fn split_seeding_shifts_fixed_seeds_only() {
        let fixed = SamplingParams::default().with_seed(10);
        assert_eq!(fixed.for_split(3).seed, Some(13));

        let free = SamplingParams::default();
        assert_eq!(free.for_split(3).seed, None);
    }

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new("/models/qwen")
            .with_dtype("float16")
            .with_rope_scaling(4.0, 32768);
        assert_eq!(config.dtype, "float16");
        assert_eq!(config.rope_scaling.as_ref().unwrap().factor, 4.0);
    }
}
