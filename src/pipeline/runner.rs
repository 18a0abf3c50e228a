//! End-to-end pipeline driver.
//!
//! Stages run in order: sample tuples, synthesize rationale+problem
//! artifacts, judge, filter, self-play with interleaved verification. Each
//! stage persists its full output as JSONL under the configured output
//! directory, and a stage whose output file already exists is loaded instead
//! of recomputed, so an interrupted run resumes at the first missing stage.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::concepts::{ConceptSampler, ConceptStore};
use crate::data::{read_jsonl, write_jsonl, SelfPlayItem, SynthesisItem, Verdict};
use crate::engine::CompletionEngine;
use crate::error::{InferenceError, PipelineError};
use crate::inference::{is_eligible, run_pass_in_process};
use crate::prompts::{
    build_judgement_prompt, build_synthesis_prompt, effective_verdict, extract_final_judgement,
    parse_artifact,
};
use crate::verify::Verifier;

use super::PipelineConfig;

/// Counts reported after a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Tuples sampled.
    pub sampled: usize,
    /// Items with a complete rationale+problem artifact.
    pub synthesized: usize,
    /// Items retained by the judgement gate.
    pub retained: usize,
    /// Items solved by at least one verified completion.
    pub solved: usize,
}

/// Drives the full synthesis pipeline over one engine.
pub struct PipelineRunner {
    config: PipelineConfig,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Runs every stage, resuming from persisted outputs where present.
    pub async fn run(
        &self,
        store: &ConceptStore,
        engine: &dyn CompletionEngine,
    ) -> Result<RunSummary, PipelineError> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let tuples = self.stage_tuples(store)?;
        let sampled = tuples.len();

        let synthesized = self.stage_synthesize(tuples, engine).await?;
        let complete = synthesized
            .iter()
            .filter(|item| item.rationale.is_some() && item.problem.is_some())
            .count();

        let judged = self.stage_judge(synthesized, engine).await?;
        let retained: Vec<SynthesisItem> = judged
            .into_iter()
            .filter(|item| item.judgement.is_some_and(Verdict::is_retained))
            .collect();
        info!(retained = retained.len(), "judgement gate applied");

        let verified = self.stage_self_play(&retained, engine).await?;
        let solved = verified.iter().filter(|item| item.solved).count();

        let summary = RunSummary {
            sampled,
            synthesized: complete,
            retained: retained.len(),
            solved,
        };
        info!(?summary, "pipeline complete");
        Ok(summary)
    }

    fn stage_path(&self, name: &str) -> PathBuf {
        self.config.output_dir.join(name)
    }

    /// Stage 1: sample concept tuples.
    fn stage_tuples(&self, store: &ConceptStore) -> Result<Vec<SynthesisItem>, PipelineError> {
        let path = self.stage_path("tuples.jsonl");
        if path.exists() {
            info!(path = %path.display(), "resuming from sampled tuples");
            return Ok(read_jsonl(&path)?);
        }

        let mut sampler = ConceptSampler::new(store);
        if let Some(seed) = self.config.seed {
            sampler = sampler.with_seed(seed);
        }
        let tuples = sampler.sample_batch(
            self.config.effective_num_problems(),
            self.config.tuple_size,
            self.config.tau,
        )?;
        let items: Vec<SynthesisItem> = tuples
            .into_iter()
            .map(|tuple| SynthesisItem::new(tuple, &self.config.difficulty))
            .collect();
        write_jsonl(&path, &items)?;
        info!(items = items.len(), "sampled concept tuples");
        Ok(items)
    }

    /// Stage 2: generate and parse rationale+problem artifacts.
    async fn stage_synthesize(
        &self,
        mut items: Vec<SynthesisItem>,
        engine: &dyn CompletionEngine,
    ) -> Result<Vec<SynthesisItem>, PipelineError> {
        let path = self.stage_path("synthesis.jsonl");
        if path.exists() {
            info!(path = %path.display(), "resuming from synthesized artifacts");
            return Ok(read_jsonl(&path)?);
        }

        let prompts: Vec<String> = items
            .iter()
            .map(|item| build_synthesis_prompt(&item.concept_tuple, &item.difficulty))
            .collect();
        let completions = engine.complete(&prompts, &self.config.sampling).await?;
        ensure_counts(prompts.len(), completions.len())?;

        let mut incomplete = 0usize;
        for (item, completion) in items.iter_mut().zip(completions) {
            let artifact = parse_artifact(&completion);
            if !artifact.is_complete() {
                incomplete += 1;
            }
            item.rationale = artifact.rationale;
            item.problem = artifact.problem;
        }
        if incomplete > 0 {
            warn!(incomplete, "artifacts missing a delimited section");
        }
        write_jsonl(&path, &items)?;
        Ok(items)
    }

    /// Stage 3: judge artifacts. Items without a complete artifact are
    /// stamped `bad` without spending a judgement call.
    async fn stage_judge(
        &self,
        mut items: Vec<SynthesisItem>,
        engine: &dyn CompletionEngine,
    ) -> Result<Vec<SynthesisItem>, PipelineError> {
        let path = self.stage_path("judged.jsonl");
        if path.exists() {
            info!(path = %path.display(), "resuming from judged artifacts");
            return Ok(read_jsonl(&path)?);
        }

        let judgeable: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.rationale.is_some() && item.problem.is_some())
            .map(|(i, _)| i)
            .collect();

        let prompts: Vec<String> = judgeable
            .iter()
            .map(|&i| {
                let item = &items[i];
                build_judgement_prompt(
                    &item.concept_tuple,
                    &item.difficulty,
                    item.rationale.as_deref().unwrap_or_default(),
                    item.problem.as_deref().unwrap_or_default(),
                )
            })
            .collect();
        let completions = engine.complete(&prompts, &self.config.sampling).await?;
        ensure_counts(prompts.len(), completions.len())?;

        for item in items.iter_mut() {
            if item.rationale.is_none() || item.problem.is_none() {
                item.judgement = Some(Verdict::Bad);
            }
        }
        for (&i, completion) in judgeable.iter().zip(completions) {
            items[i].judgement = Some(match extract_final_judgement(&completion) {
                Some(parsed) => effective_verdict(parsed),
                None => Verdict::Bad,
            });
        }
        write_jsonl(&path, &items)?;
        Ok(items)
    }

    /// Stage 4: self-play with interleaved verification.
    ///
    /// Each round appends one completion per still-eligible item and then
    /// verifies, so items that solve early stop consuming engine calls.
    async fn stage_self_play(
        &self,
        retained: &[SynthesisItem],
        engine: &dyn CompletionEngine,
    ) -> Result<Vec<SelfPlayItem>, PipelineError> {
        let path = self.stage_path("verified.jsonl");
        if path.exists() {
            info!(path = %path.display(), "resuming from verified items");
            return Ok(read_jsonl(&path)?);
        }

        let selfplay_path = self.stage_path("selfplay.jsonl");
        let mut items: Vec<SelfPlayItem> = if selfplay_path.exists() {
            info!(path = %selfplay_path.display(), "resuming self-play state");
            read_jsonl(&selfplay_path)?
        } else {
            retained
                .iter()
                .filter_map(|item| {
                    item.problem.as_ref().map(|problem| {
                        let mut sp = SelfPlayItem::new(problem.clone());
                        sp.id = item.id.clone();
                        sp
                    })
                })
                .collect()
        };

        let verifier = Verifier::new(self.config.eval_type)
            .with_num_workers(self.config.num_workers);

        while items
            .iter()
            .any(|item| is_eligible(item, self.config.num_completions))
        {
            items = run_pass_in_process(
                items,
                engine,
                &self.config.sampling,
                self.config.num_completions,
            )
            .await?;
            items = verifier.verify_all(items).await?;
            write_jsonl(&selfplay_path, &items)?;
        }

        write_jsonl(&path, &items)?;
        Ok(items)
    }
}

fn ensure_counts(expected: usize, got: usize) -> Result<(), PipelineError> {
    if expected != got {
        return Err(InferenceError::CompletionCountMismatch { expected, got }.into());
    }
    Ok(())
}
