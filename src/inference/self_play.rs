//! Self-play pass driver.
//!
//! A pass appends at most one completion to each eligible item. Solved
//! items and items that already reached the completion target pass through
//! unchanged, so repeated passes converge monotonically.

use tracing::info;

use crate::data::SelfPlayItem;
use crate::engine::{CompletionEngine, SamplingParams};
use crate::error::InferenceError;

/// True when a pass should generate for this item: not yet solved and still
/// short of the completion target.
pub fn is_eligible(item: &SelfPlayItem, num_completions: usize) -> bool {
    !item.solved && item.completions.len() < num_completions
}

/// Runs one self-play pass, appending one completion per eligible item.
///
/// Ineligible items are returned byte-identical; output order equals input
/// order. Completions are appended in generation order.
pub async fn run_pass_in_process(
    mut items: Vec<SelfPlayItem>,
    engine: &dyn CompletionEngine,
    params: &SamplingParams,
    num_completions: usize,
) -> Result<Vec<SelfPlayItem>, InferenceError> {
    params.validate()?;

    let eligible: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| is_eligible(item, num_completions))
        .map(|(i, _)| i)
        .collect();
    info!(
        eligible = eligible.len(),
        total = items.len(),
        "self-play pass"
    );
    if eligible.is_empty() {
        return Ok(items);
    }

    let prompts: Vec<String> = eligible.iter().map(|&i| items[i].prompt.clone()).collect();
    let completions = engine.complete(&prompts, params).await?;
    if completions.len() != prompts.len() {
        return Err(InferenceError::CompletionCountMismatch {
            expected: prompts.len(),
            got: completions.len(),
        });
    }

    for (&i, completion) in eligible.iter().zip(completions) {
        items[i].completions.push(completion);
    }
    Ok(items)
}

/// Loops passes until every item is solved or has `num_completions`
/// completions. Each pass appends at most one completion per item.
pub async fn run_until_target(
    mut items: Vec<SelfPlayItem>,
    engine: &dyn CompletionEngine,
    params: &SamplingParams,
    num_completions: usize,
) -> Result<Vec<SelfPlayItem>, InferenceError> {
    while items.iter().any(|item| is_eligible(item, num_completions)) {
        items = run_pass_in_process(items, engine, params, num_completions).await?;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FnEngine;

    fn item(prompt: &str) -> SelfPlayItem {
        SelfPlayItem::new(prompt)
    }

    #[tokio::test]
    async fn pass_appends_one_completion_to_eligible_items() {
        let engine = FnEngine::new(|p: &str| format!("sol:{p}"));
        let items = vec![item("a"), item("b")];

        let out = run_pass_in_process(items, &engine, &SamplingParams::default(), 4)
            .await
            .unwrap();
        assert_eq!(out[0].completions, vec!["sol:a"]);
        assert_eq!(out[1].completions, vec!["sol:b"]);
    }

    #[tokio::test]
    async fn solved_items_pass_through_unchanged() {
        let engine = FnEngine::new(|p: &str| format!("sol:{p}"));
        let mut solved = item("done");
        solved.solved = true;
        solved.completions = vec!["earlier".to_string()];
        let items = vec![solved, item("open")];

        let out = run_pass_in_process(items, &engine, &SamplingParams::default(), 4)
            .await
            .unwrap();
        // The solved item gains nothing; the open one gains exactly one.
        assert_eq!(out[0].completions, vec!["earlier"]);
        assert_eq!(out[1].completions, vec!["sol:open"]);
    }

    #[tokio::test]
    async fn items_at_target_are_skipped() {
        let engine = FnEngine::new(|_: &str| "extra".to_string());
        let mut full = item("full");
        full.completions = vec!["1".to_string(), "2".to_string()];

        let out = run_pass_in_process(vec![full], &engine, &SamplingParams::default(), 2)
            .await
            .unwrap();
        assert_eq!(out[0].completions.len(), 2);
    }

    #[tokio::test]
    async fn run_until_target_accumulates_to_the_cap() {
        let engine = FnEngine::new(|p: &str| format!("sol:{p}"));
        let items = vec![item("x")];

        let out = run_until_target(items, &engine, &SamplingParams::default(), 3)
            .await
            .unwrap();
        assert_eq!(out[0].completions.len(), 3);
    }

    #[test]
    fn eligibility_rules() {
        let mut it = item("p");
        assert!(is_eligible(&it, 1));

        it.completions.push("c".to_string());
        assert!(!is_eligible(&it, 1));
        assert!(is_eligible(&it, 2));

        it.solved = true;
        assert!(!is_eligible(&it, 2));
    }
}
