//! vLLM-compatible server launcher and HTTP client.
//!
//! Each inference worker owns one server process bound to its GPU subset.
//! The parent driver sets `CUDA_VISIBLE_DEVICES` on the worker before it
//! starts, so the runtime only ever sees the devices of its split.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::InferenceError;

use super::{CompletionEngine, EngineConfig, SamplingParams};

/// How long to wait for the server health endpoint before giving up.
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(600);

/// A managed vLLM server subprocess.
pub struct VllmServer {
    child: Child,
    base_url: String,
}

impl VllmServer {
    /// Launches `vllm serve` for the given engine config and waits until the
    /// health endpoint responds.
    ///
    /// `tensor_parallel` is the number of devices visible to this process;
    /// the shard uses tensor parallelism over all of them.
    pub async fn launch(
        config: &EngineConfig,
        port: u16,
        tensor_parallel: usize,
    ) -> Result<Self, InferenceError> {
        let mut cmd = Command::new("vllm");
        cmd.arg("serve")
            .arg(&config.model_path)
            .args(["--port", &port.to_string()])
            .args(["--dtype", &config.dtype])
            .args(["--tensor-parallel-size", &tensor_parallel.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if let Some(tokenizer) = &config.tokenizer_path {
            cmd.args(["--tokenizer", tokenizer]);
        }
        if let Some(rope) = &config.rope_scaling {
            let spec = serde_json::json!({
                "rope_type": "yarn",
                "factor": rope.factor,
                "original_max_position_embeddings": rope.original_max_position_embeddings,
            });
            cmd.args(["--rope-scaling", &spec.to_string()]);
        }

        info!(model = %config.model_path, port, tensor_parallel, "launching vllm server");
        let child = cmd.spawn()?;
        let server = Self {
            child,
            base_url: format!("http://127.0.0.1:{port}"),
        };
        server.wait_ready(DEFAULT_STARTUP_TIMEOUT).await?;
        Ok(server)
    }

    /// Base URL of the running server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<(), InferenceError> {
        let client = Client::new();
        let url = format!("{}/health", self.base_url);
        let start = Instant::now();

        while start.elapsed() < timeout {
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    info!(elapsed = ?start.elapsed(), "vllm server ready");
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        Err(InferenceError::EngineStartupTimeout(timeout))
    }

    /// Kills the server process.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("failed to kill vllm server: {e}");
        }
    }
}

/// HTTP client against an OpenAI-compatible completions API.
#[derive(Debug, Clone)]
pub struct VllmEngine {
    client: Client,
    base_url: String,
    model: String,
}

impl VllmEngine {
    /// Creates a client for the server at `base_url` serving `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    async fn complete_batch(
        &self,
        prompts: &[String],
        params: &SamplingParams,
    ) -> Result<Vec<String>, InferenceError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            prompt: prompts.to_vec(),
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
            repetition_penalty: params.repetition_penalty,
            min_tokens: params.min_len,
            max_tokens: params.max_len,
            seed: params.seed,
        };

        let response: CompletionResponse = self
            .client
            .post(format!("{}/v1/completions", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.choices.len() != prompts.len() {
            return Err(InferenceError::CompletionCountMismatch {
                expected: prompts.len(),
                got: response.choices.len(),
            });
        }

        let mut choices = response.choices;
        choices.sort_by_key(|c| c.index);
        Ok(choices.into_iter().map(|c| c.text).collect())
    }

    async fn complete_chat(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: params.temperature,
            top_p: params.top_p,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
            max_tokens: params.max_len,
            seed: params.seed,
            reasoning_effort: params.reasoning_effort.clone(),
        };

        let response: ChatResponse = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| InferenceError::Engine("chat response carried no choices".to_string()))
    }
}

#[async_trait]
impl CompletionEngine for VllmEngine {
    async fn complete(
        &self,
        prompts: &[String],
        params: &SamplingParams,
    ) -> Result<Vec<String>, InferenceError> {
        params.validate()?;
        debug!(count = prompts.len(), chat = params.use_chat_template, "submitting prompts");

        if params.use_chat_template {
            // The chat endpoint applies the model's configured template; it
            // takes one conversation at a time.
            let mut completions = Vec::with_capacity(prompts.len());
            for prompt in prompts {
                completions.push(self.complete_chat(prompt, params).await?);
            }
            Ok(completions)
        } else {
            self.complete_batch(prompts, params).await
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    prompt: Vec<String>,
    temperature: f64,
    top_p: f64,
    top_k: i32,
    presence_penalty: f64,
    frequency_penalty: f64,
    repetition_penalty: f64,
    min_tokens: u32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    index: usize,
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    top_p: f64,
    presence_penalty: f64,
    frequency_penalty: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
