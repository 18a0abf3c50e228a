//! CLI command definitions for promptforge.
//!
//! Every pipeline stage is independently invocable on JSONL files, and the
//! `pipeline` command runs them end to end. A hidden `shard-worker`
//! subcommand is how the distributed driver re-enters this binary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use tracing::info;

use crate::concepts::{ConceptSampler, ConceptStore};
use crate::data::{read_jsonl, write_jsonl, EvalType, PromptItem, SelfPlayItem, SynthesisItem};
use crate::engine::{EngineConfig, SamplingParams, VllmEngine, VllmServer};
use crate::inference::{run_distributed, run_shard_worker, DistributedConfig, WorkerMode};
use crate::pipeline::{PipelineConfig, PipelineRunner};
use crate::prompts::{
    build_judgement_prompt, build_synthesis_prompt, effective_verdict, extract_final_judgement,
    parse_artifact,
};
use crate::verify::Verifier;

/// Seed sentinel meaning "non-deterministic".
const SEED_NONE: i64 = -1;

/// Concept-guided problem synthesis pipeline.
#[derive(Parser)]
#[command(name = "promptforge")]
#[command(about = "Concept-guided synthesis of verified reasoning problems")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Sample concept tuples from seed concept lists.
    Sample(SampleArgs),

    /// Generate rationale+problem artifacts for sampled tuples.
    Synthesize(SynthesizeArgs),

    /// Judge synthesized artifacts and stamp quality verdicts.
    Judge(JudgeArgs),

    /// Run self-play passes, appending completions to eligible items.
    SelfPlay(SelfPlayArgs),

    /// Verify accumulated completions against tests or reference answers.
    Verify(VerifyArgs),

    /// Run the full pipeline: sample, synthesize, judge, self-play, verify.
    Pipeline(Box<PipelineArgs>),

    /// Internal entry point for distributed shard workers.
    #[command(hide = true)]
    ShardWorker(ShardWorkerArgs),
}

/// Model and runtime launch options shared by inference commands.
#[derive(Parser, Debug, Clone)]
pub struct EngineArgs {
    /// Model checkpoint path or hub identifier.
    #[arg(long = "model_path")]
    pub model_path: String,

    /// Tokenizer path (defaults to the model path).
    #[arg(long = "tokenizer_path")]
    pub tokenizer_path: Option<String>,

    /// Numeric precision.
    #[arg(long, default_value = "bfloat16")]
    pub dtype: String,

    /// Yarn rope-scaling factor; enables rope extension.
    #[arg(long, requires = "original_max_position_embeddings")]
    pub factor: Option<f64>,

    /// Original max positional embeddings of the model, for rope scaling.
    #[arg(long = "original_max_position_embeddings", requires = "factor")]
    pub original_max_position_embeddings: Option<u32>,
}

impl EngineArgs {
    fn to_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(&self.model_path).with_dtype(&self.dtype);
        if let Some(tokenizer) = &self.tokenizer_path {
            config = config.with_tokenizer(tokenizer);
        }
        if let (Some(factor), Some(omp)) = (self.factor, self.original_max_position_embeddings) {
            config = config.with_rope_scaling(factor, omp);
        }
        config
    }
}

/// Sampling options shared by inference commands.
#[derive(Parser, Debug, Clone)]
pub struct SamplingArgs {
    /// Sampling temperature.
    #[arg(long, default_value = "1.0")]
    pub temperature: f64,

    /// Nucleus sampling mass.
    #[arg(long = "top_p", default_value = "1.0")]
    pub top_p: f64,

    /// Top-k cutoff; -1 disables.
    #[arg(long = "top_k", default_value = "-1", allow_hyphen_values = true)]
    pub top_k: i32,

    #[arg(long = "presence_penalty", default_value = "0.0")]
    pub presence_penalty: f64,

    #[arg(long = "frequency_penalty", default_value = "0.0")]
    pub frequency_penalty: f64,

    #[arg(long = "repetition_penalty", default_value = "1.0")]
    pub repetition_penalty: f64,

    /// Minimum completion length in tokens.
    #[arg(long = "min_len", default_value = "0")]
    pub min_len: u32,

    /// Maximum completion length in tokens.
    #[arg(long = "max_len", default_value = "4096")]
    pub max_len: u32,

    /// Random seed; -1 means non-deterministic.
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    pub seed: i64,

    /// Wrap prompts with the model's chat template.
    #[arg(long = "use_chat_template")]
    pub use_chat_template: bool,

    /// Reasoning effort passed through to chat-template rendering.
    #[arg(long = "reasoning_effort")]
    pub reasoning_effort: Option<String>,
}

impl SamplingArgs {
    fn to_params(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            repetition_penalty: self.repetition_penalty,
            min_len: self.min_len,
            max_len: self.max_len,
            seed: seed_option(self.seed),
            use_chat_template: self.use_chat_template,
            reasoning_effort: self.reasoning_effort.clone(),
        }
    }
}

/// GPU partitioning options for distributed commands.
#[derive(Parser, Debug, Clone)]
pub struct ParallelArgs {
    /// Total GPUs available to this run.
    #[arg(long = "n_gpus", default_value = "1")]
    pub n_gpus: usize,

    /// Worker processes; must divide the GPU count.
    #[arg(long = "n_splits", default_value = "1")]
    pub n_splits: usize,
}

/// Arguments for `promptforge sample`.
#[derive(Parser, Debug)]
pub struct SampleArgs {
    /// JSONL of seed concept lists, one {"concepts": [...]} record per line.
    #[arg(long = "data_path")]
    pub data_path: PathBuf,

    /// JSON map from concept to embedding vector.
    #[arg(long = "embedding_path")]
    pub embedding_path: PathBuf,

    /// Output JSONL of sampled tuples.
    #[arg(long = "output_path")]
    pub output_path: PathBuf,

    /// Number of tuples to sample.
    #[arg(long = "num_problems", default_value = "100")]
    pub num_problems: usize,

    /// Concepts per tuple.
    #[arg(long = "tuple_size", default_value = "5")]
    pub tuple_size: usize,

    /// Softmax temperature for tuple extension.
    #[arg(long, default_value = "1.0")]
    pub tau: f64,

    /// Target difficulty label carried into prompts.
    #[arg(long, default_value = "olympiad")]
    pub difficulty: String,

    /// Random seed; -1 means non-deterministic.
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    pub seed: i64,
}

/// Arguments for `promptforge synthesize`.
#[derive(Parser, Debug)]
pub struct SynthesizeArgs {
    /// Input JSONL of sampled tuples.
    #[arg(long = "data_path")]
    pub data_path: PathBuf,

    /// Output JSONL with rationale and problem fields filled.
    #[arg(long = "output_path")]
    pub output_path: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    #[command(flatten)]
    pub parallel: ParallelArgs,
}

/// Arguments for `promptforge judge`.
#[derive(Parser, Debug)]
pub struct JudgeArgs {
    /// Input JSONL of synthesized artifacts.
    #[arg(long = "data_path")]
    pub data_path: PathBuf,

    /// Output JSONL with judgement verdicts stamped.
    #[arg(long = "output_path")]
    pub output_path: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    #[command(flatten)]
    pub parallel: ParallelArgs,
}

/// Arguments for `promptforge self-play`.
#[derive(Parser, Debug)]
pub struct SelfPlayArgs {
    /// Input JSONL of self-play items.
    #[arg(long = "data_path")]
    pub data_path: PathBuf,

    /// Output JSONL with appended completions.
    #[arg(long = "output_path")]
    pub output_path: PathBuf,

    /// Completion target per item.
    #[arg(long = "num_completions", default_value = "4")]
    pub num_completions: usize,

    /// Number of self-play passes over the data; each pass appends at most
    /// one completion per eligible item. More than one run requires a
    /// non-deterministic seed.
    #[arg(long = "expected_runs", default_value = "1")]
    pub expected_runs: usize,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    #[command(flatten)]
    pub parallel: ParallelArgs,
}

/// Arguments for `promptforge verify`.
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Input JSONL of self-play items with completions.
    #[arg(long = "data_path")]
    pub data_path: PathBuf,

    /// Output JSONL with solved flags and per-completion outcomes.
    #[arg(long = "output_path")]
    pub output_path: PathBuf,

    /// Verification mode.
    #[arg(long = "eval_type", value_enum)]
    pub eval_type: EvalType,

    /// Concurrent verification workers.
    #[arg(long = "num_workers", default_value = "4")]
    pub num_workers: usize,
}

/// Arguments for `promptforge pipeline`.
#[derive(Parser, Debug)]
pub struct PipelineArgs {
    /// JSONL of seed concept lists.
    #[arg(long = "data_path")]
    pub data_path: PathBuf,

    /// JSON map from concept to embedding vector.
    #[arg(long = "embedding_path")]
    pub embedding_path: PathBuf,

    /// Directory for stage outputs; reruns resume from it.
    #[arg(long = "output_dir")]
    pub output_dir: PathBuf,

    /// Number of problems to synthesize.
    #[arg(long = "num_problems", default_value = "100")]
    pub num_problems: usize,

    /// Concepts per tuple.
    #[arg(long = "tuple_size", default_value = "5")]
    pub tuple_size: usize,

    /// Softmax temperature for tuple extension.
    #[arg(long, default_value = "1.0")]
    pub tau: f64,

    /// Target difficulty label.
    #[arg(long, default_value = "olympiad")]
    pub difficulty: String,

    /// Self-play completion target per item.
    #[arg(long = "num_completions", default_value = "4")]
    pub num_completions: usize,

    /// Verification mode.
    #[arg(long = "eval_type", value_enum)]
    pub eval_type: EvalType,

    /// Concurrent verification workers.
    #[arg(long = "num_workers", default_value = "4")]
    pub num_workers: usize,

    /// Cap the run at a handful of items for quick iteration.
    #[arg(long)]
    pub debug: bool,

    /// Port the local inference runtime serves on.
    #[arg(long, default_value = "8000")]
    pub port: u16,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    #[command(flatten)]
    pub parallel: ParallelArgs,
}

/// Arguments for the hidden `shard-worker` subcommand.
#[derive(Parser, Debug)]
pub struct ShardWorkerArgs {
    /// Worker configuration written by the parent process.
    #[arg(long = "config_path")]
    pub config_path: PathBuf,

    /// Shard input JSONL.
    #[arg(long = "data_path")]
    pub data_path: PathBuf,

    /// Shard output JSONL.
    #[arg(long = "output_path")]
    pub output_path: PathBuf,
}

/// Parse CLI arguments without running a command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and execute the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Execute an already-parsed command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Sample(args) => run_sample_command(args),
        Commands::Synthesize(args) => run_synthesize_command(args).await,
        Commands::Judge(args) => run_judge_command(args).await,
        Commands::SelfPlay(args) => run_self_play_command(args).await,
        Commands::Verify(args) => run_verify_command(args).await,
        Commands::Pipeline(args) => run_pipeline_command(*args).await,
        Commands::ShardWorker(args) => {
            run_shard_worker(&args.config_path, &args.data_path, &args.output_path).await?;
            Ok(())
        }
    }
}

/// One seed concept list, as stored on disk.
#[derive(Debug, Deserialize)]
struct ConceptListRecord {
    concepts: Vec<String>,
}

fn seed_option(seed: i64) -> Option<u64> {
    if seed == SEED_NONE {
        None
    } else {
        Some(seed as u64)
    }
}

fn load_store(data_path: &Path, embedding_path: &Path) -> anyhow::Result<ConceptStore> {
    let records: Vec<ConceptListRecord> = read_jsonl(data_path)?;
    let seed_lists: Vec<Vec<String>> = records.into_iter().map(|r| r.concepts).collect();
    let embeddings: HashMap<String, Vec<f64>> =
        serde_json::from_slice(&std::fs::read(embedding_path)?)?;
    let store = ConceptStore::build(&seed_lists, &embeddings)?;
    info!(concepts = store.len(), "concept store built");
    Ok(store)
}

fn run_sample_command(args: SampleArgs) -> anyhow::Result<()> {
    let store = load_store(&args.data_path, &args.embedding_path)?;
    let mut sampler = ConceptSampler::new(&store);
    if let Some(seed) = seed_option(args.seed) {
        sampler = sampler.with_seed(seed);
    }

    let tuples = sampler.sample_batch(args.num_problems, args.tuple_size, args.tau)?;
    let items: Vec<SynthesisItem> = tuples
        .into_iter()
        .map(|tuple| SynthesisItem::new(tuple, &args.difficulty))
        .collect();
    write_jsonl(&args.output_path, &items)?;
    info!(items = items.len(), output = %args.output_path.display(), "tuples sampled");
    Ok(())
}

/// Runs one distributed generate pass over prompts built from the given
/// items, returning the completions in item order.
async fn generate_distributed(
    items: &[SynthesisItem],
    prompts: Vec<String>,
    engine: &EngineArgs,
    sampling: &SamplingArgs,
    parallel: &ParallelArgs,
) -> anyhow::Result<Vec<String>> {
    debug_assert_eq!(items.len(), prompts.len());
    let workdir = tempfile::tempdir()?;
    let prompts_path = workdir.path().join("prompts.jsonl");
    let output_path = workdir.path().join("completions.jsonl");

    let prompt_items: Vec<PromptItem> = items
        .iter()
        .zip(prompts)
        .map(|(item, prompt)| {
            let mut p = PromptItem::new(prompt);
            p.id = item.id.clone();
            p
        })
        .collect();
    write_jsonl(&prompts_path, &prompt_items)?;

    let config = DistributedConfig {
        mode: WorkerMode::Generate,
        engine: engine.to_config(),
        sampling: sampling.to_params(),
        n_gpus: parallel.n_gpus,
        n_splits: parallel.n_splits,
        num_completions: 1,
        base_port: 8000,
    };
    run_distributed(&prompts_path, &output_path, &config).await?;

    let completed: Vec<PromptItem> = read_jsonl(&output_path)?;
    Ok(completed
        .into_iter()
        .map(|item| item.completion.unwrap_or_default())
        .collect())
}

async fn run_synthesize_command(args: SynthesizeArgs) -> anyhow::Result<()> {
    let mut items: Vec<SynthesisItem> = read_jsonl(&args.data_path)?;
    let prompts: Vec<String> = items
        .iter()
        .map(|item| build_synthesis_prompt(&item.concept_tuple, &item.difficulty))
        .collect();

    let completions =
        generate_distributed(&items, prompts, &args.engine, &args.sampling, &args.parallel).await?;
    for (item, completion) in items.iter_mut().zip(completions) {
        let artifact = parse_artifact(&completion);
        item.rationale = artifact.rationale;
        item.problem = artifact.problem;
    }
    write_jsonl(&args.output_path, &items)?;
    info!(items = items.len(), "synthesis complete");
    Ok(())
}

async fn run_judge_command(args: JudgeArgs) -> anyhow::Result<()> {
    let mut items: Vec<SynthesisItem> = read_jsonl(&args.data_path)?;
    let judgeable: Vec<SynthesisItem> = items
        .iter()
        .filter(|item| item.rationale.is_some() && item.problem.is_some())
        .cloned()
        .collect();
    let prompts: Vec<String> = judgeable
        .iter()
        .map(|item| {
            build_judgement_prompt(
                &item.concept_tuple,
                &item.difficulty,
                item.rationale.as_deref().unwrap_or_default(),
                item.problem.as_deref().unwrap_or_default(),
            )
        })
        .collect();

    let completions =
        generate_distributed(&judgeable, prompts, &args.engine, &args.sampling, &args.parallel)
            .await?;

    let mut remaining = completions.iter();
    for item in items.iter_mut() {
        if item.rationale.is_none() || item.problem.is_none() {
            item.judgement = Some(crate::data::Verdict::Bad);
            continue;
        }
        // Judgeable items appear in the same relative order in both lists.
        if let Some(completion) = remaining.next() {
            item.judgement = Some(match extract_final_judgement(completion) {
                Some(parsed) => effective_verdict(parsed),
                None => crate::data::Verdict::Bad,
            });
        }
    }
    write_jsonl(&args.output_path, &items)?;
    info!(items = items.len(), "judgement complete");
    Ok(())
}

async fn run_self_play_command(args: SelfPlayArgs) -> anyhow::Result<()> {
    if args.expected_runs > 1 && seed_option(args.sampling.seed).is_some() {
        anyhow::bail!(
            "expected_runs > 1 requires a non-deterministic seed (-1): \
             repeated runs with a fixed seed would regenerate identical completions"
        );
    }

    let config = DistributedConfig {
        mode: WorkerMode::SelfPlay,
        engine: args.engine.to_config(),
        sampling: args.sampling.to_params(),
        n_gpus: args.parallel.n_gpus,
        n_splits: args.parallel.n_splits,
        num_completions: args.num_completions,
        base_port: 8000,
    };

    // The first run reads the input; later runs iterate on the output.
    let mut input = args.data_path.clone();
    for run in 0..args.expected_runs {
        info!(run, total = args.expected_runs, "self-play run");
        run_distributed(&input, &args.output_path, &config).await?;
        input = args.output_path.clone();
    }
    Ok(())
}

async fn run_verify_command(args: VerifyArgs) -> anyhow::Result<()> {
    let items: Vec<SelfPlayItem> = read_jsonl(&args.data_path)?;
    for item in &items {
        item.validate(args.eval_type)?;
    }

    let verifier = Verifier::new(args.eval_type).with_num_workers(args.num_workers);
    let items = verifier.verify_all(items).await?;
    write_jsonl(&args.output_path, &items)?;

    let solved = items.iter().filter(|item| item.solved).count();
    info!(total = items.len(), solved, "verification complete");
    Ok(())
}

async fn run_pipeline_command(args: PipelineArgs) -> anyhow::Result<()> {
    let store = load_store(&args.data_path, &args.embedding_path)?;

    let mut config = PipelineConfig::new(&args.output_dir)
        .with_num_problems(args.num_problems)
        .with_tuple_size(args.tuple_size)
        .with_tau(args.tau)
        .with_difficulty(&args.difficulty)
        .with_num_completions(args.num_completions)
        .with_sampling(args.sampling.to_params())
        .with_eval_type(args.eval_type)
        .with_debug(args.debug);
    config.num_workers = args.num_workers;
    if let Some(seed) = seed_option(args.sampling.seed) {
        config = config.with_seed(seed);
    }

    let engine_config = args.engine.to_config();
    let server = VllmServer::launch(&engine_config, args.port, args.parallel.n_gpus).await?;
    let engine = VllmEngine::new(server.base_url(), &engine_config.model_path);

    let result = PipelineRunner::new(config).run(&store, &engine).await;
    server.shutdown().await;
    let summary = result?;
    info!(?summary, "pipeline run finished");
    Ok(())
}
