//! Batched inference driver and the shard-worker protocol.
//!
//! The parent process shards the input JSONL, spawns one worker process per
//! split with `CUDA_VISIBLE_DEVICES` set to that split's GPU subset, waits
//! for all workers, and merges shard outputs in split order. A failing
//! worker aborts the run and no output is committed.
//!
//! Workers re-enter this binary through a hidden subcommand and call
//! [`run_shard_worker`]: launch the inference runtime over the visible
//! devices, process the shard, write the shard output.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::data::{read_jsonl, write_jsonl, PromptItem, SelfPlayItem};
use crate::engine::{CompletionEngine, EngineConfig, SamplingParams, VllmEngine, VllmServer};
use crate::error::InferenceError;

use super::{gpu_assignments, run_pass_in_process, split_ranges};

/// What a shard worker does with its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// One completion per item (`completion` field).
    Generate,
    /// Append one completion per eligible self-play item.
    SelfPlay,
}

/// Configuration for a distributed inference run.
#[derive(Debug, Clone)]
pub struct DistributedConfig {
    pub mode: WorkerMode,
    pub engine: EngineConfig,
    pub sampling: SamplingParams,
    /// Total GPUs to partition.
    pub n_gpus: usize,
    /// Number of worker processes; must divide `n_gpus`.
    pub n_splits: usize,
    /// Self-play completion target; ignored in generate mode.
    pub num_completions: usize,
    /// Each worker serves its runtime at `base_port + split_id`.
    pub base_port: u16,
}

impl DistributedConfig {
    /// Creates a config with a single split over one GPU.
    pub fn new(mode: WorkerMode, engine: EngineConfig) -> Self {
        Self {
            mode,
            engine,
            sampling: SamplingParams::default(),
            n_gpus: 1,
            n_splits: 1,
            num_completions: 1,
            base_port: 8000,
        }
    }
}

/// Everything a shard worker needs, written to disk by the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardWorkerConfig {
    pub mode: WorkerMode,
    pub engine: EngineConfig,
    pub sampling: SamplingParams,
    pub split_id: usize,
    /// Devices visible to this worker; its tensor-parallel degree.
    pub tensor_parallel: usize,
    pub port: u16,
    pub num_completions: usize,
}

/// Runs one completion per item against an engine, preserving input order.
pub async fn generate_in_process(
    items: Vec<PromptItem>,
    engine: &dyn CompletionEngine,
    params: &SamplingParams,
) -> Result<Vec<PromptItem>, InferenceError> {
    params.validate()?;
    let prompts: Vec<String> = items.iter().map(|item| item.prompt.clone()).collect();
    let completions = engine.complete(&prompts, params).await?;
    if completions.len() != items.len() {
        return Err(InferenceError::CompletionCountMismatch {
            expected: items.len(),
            got: completions.len(),
        });
    }

    Ok(items
        .into_iter()
        .zip(completions)
        .map(|(mut item, completion)| {
            item.completion = Some(completion);
            item
        })
        .collect())
}

/// Shards the input JSONL across worker processes and merges their outputs.
///
/// Records are sharded as raw JSON values; only workers interpret the
/// schema. Output order equals input order because shards are contiguous
/// and merged in split-id order. If any worker exits non-zero the run fails
/// and `output_path` is not written.
pub async fn run_distributed(
    data_path: &Path,
    output_path: &Path,
    config: &DistributedConfig,
) -> Result<(), InferenceError> {
    config.sampling.validate()?;
    let assignments = gpu_assignments(config.n_gpus, config.n_splits)?;
    let tensor_parallel = config.n_gpus / config.n_splits;

    let records: Vec<Value> = read_jsonl(data_path)?;
    info!(
        items = records.len(),
        splits = config.n_splits,
        gpus = config.n_gpus,
        "starting distributed inference"
    );

    let workdir = tempfile::tempdir()?;
    let ranges = split_ranges(records.len(), config.n_splits);

    let exe = std::env::current_exe()?;
    let mut children = Vec::with_capacity(config.n_splits);
    for (split_id, (range, gpus)) in ranges.iter().zip(&assignments).enumerate() {
        let shard_in = workdir.path().join(format!("shard-{split_id}.jsonl"));
        let shard_out = workdir.path().join(format!("shard-{split_id}.out.jsonl"));
        let config_path = workdir.path().join(format!("shard-{split_id}.config.json"));

        write_jsonl(&shard_in, &records[range.clone()])?;
        let worker_config = ShardWorkerConfig {
            mode: config.mode,
            engine: config.engine.clone(),
            sampling: config.sampling.clone(),
            split_id,
            tensor_parallel,
            port: config.base_port + split_id as u16,
            num_completions: config.num_completions,
        };
        let config_bytes = serde_json::to_vec_pretty(&worker_config)
            .map_err(crate::error::DataError::from)?;
        std::fs::write(&config_path, config_bytes)?;

        // The device mask must be in place before the worker starts, so the
        // inference runtime only ever sees its own partition.
        let child = tokio::process::Command::new(&exe)
            .arg("shard-worker")
            .arg("--config_path")
            .arg(&config_path)
            .arg("--data_path")
            .arg(&shard_in)
            .arg("--output_path")
            .arg(&shard_out)
            .env("CUDA_VISIBLE_DEVICES", gpus)
            .spawn()?;
        children.push((split_id, child, shard_out));
    }

    let mut shard_outputs = Vec::with_capacity(children.len());
    let mut failure: Option<InferenceError> = None;
    for (split_id, mut child, shard_out) in children {
        let status = child.wait().await?;
        if status.success() {
            shard_outputs.push(shard_out);
        } else if failure.is_none() {
            failure = Some(InferenceError::WorkerFailed {
                split_id,
                message: format!("exit status {status}"),
            });
        } else {
            warn!(split_id, %status, "additional worker failure");
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    let mut merged: Vec<Value> = Vec::with_capacity(records.len());
    for shard_out in shard_outputs {
        merged.extend(read_jsonl::<Value>(&shard_out)?);
    }
    write_jsonl(output_path, &merged)?;
    info!(items = merged.len(), output = %output_path.display(), "distributed inference complete");
    Ok(())
}

/// Entry point for the hidden shard-worker subcommand.
///
/// Launches the inference runtime over the devices this process can see,
/// processes its shard, and writes the shard output.
pub async fn run_shard_worker(
    config_path: &Path,
    data_path: &Path,
    output_path: &Path,
) -> Result<(), InferenceError> {
    let config: ShardWorkerConfig = serde_json::from_slice(&std::fs::read(config_path)?)
        .map_err(crate::error::DataError::from)?;
    info!(split_id = config.split_id, mode = ?config.mode, "shard worker starting");

    let server = VllmServer::launch(&config.engine, config.port, config.tensor_parallel).await?;
    let engine = VllmEngine::new(server.base_url(), &config.engine.model_path);

    let result = run_shard(&config, &engine, data_path, output_path).await;
    server.shutdown().await;
    result
}

async fn run_shard(
    config: &ShardWorkerConfig,
    engine: &dyn CompletionEngine,
    data_path: &Path,
    output_path: &Path,
) -> Result<(), InferenceError> {
    match config.mode {
        WorkerMode::Generate => {
            let items: Vec<PromptItem> = read_jsonl(data_path)?;
            let items = generate_in_process(items, engine, &config.sampling).await?;
            write_jsonl(output_path, &items)?;
        }
        WorkerMode::SelfPlay => {
            let items: Vec<SelfPlayItem> = read_jsonl(data_path)?;
            let params = config.sampling.for_split(config.split_id as u64);
            let items =
                run_pass_in_process(items, engine, &params, config.num_completions).await?;
            write_jsonl(output_path, &items)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FnEngine;

    #[tokio::test]
    async fn completions_preserve_input_order() {
        let items: Vec<PromptItem> = (0..17).map(|i| PromptItem::new(format!("p{i}"))).collect();
        let engine = FnEngine::new(|prompt: &str| format!("echo {prompt}"));

        let out = generate_in_process(items, &engine, &SamplingParams::default())
            .await
            .unwrap();

        assert_eq!(out.len(), 17);
        for (i, item) in out.iter().enumerate() {
            assert_eq!(item.prompt, format!("p{i}"));
            assert_eq!(item.completion.as_deref(), Some(format!("echo p{i}").as_str()));
        }
    }

    #[tokio::test]
    async fn invalid_sampling_is_rejected_before_work() {
        let engine = FnEngine::new(|_: &str| String::new());
        let params = SamplingParams::default().with_top_p(2.0);
        let result = generate_in_process(vec![PromptItem::new("p")], &engine, &params).await;
        assert!(matches!(result, Err(InferenceError::InvalidSampling(_))));
    }

    #[test]
    fn worker_config_round_trips_through_json() {
        let config = ShardWorkerConfig {
            mode: WorkerMode::SelfPlay,
            engine: EngineConfig::new("/models/m").with_rope_scaling(2.0, 8192),
            sampling: SamplingParams::default().with_seed(5),
            split_id: 2,
            tensor_parallel: 4,
            port: 8002,
            num_completions: 8,
        };
        // Pretty-printed, as the parent writes it for workers.
        let bytes = serde_json::to_vec_pretty(&config).unwrap();
        let loaded: ShardWorkerConfig = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(loaded.mode, WorkerMode::SelfPlay);
        assert_eq!(loaded.split_id, 2);
        assert_eq!(loaded.sampling.seed, Some(5));
        assert_eq!(loaded.engine.rope_scaling.unwrap().factor, 2.0);
    }
}
