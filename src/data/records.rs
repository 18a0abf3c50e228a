//! Record types shared across pipeline stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DataError;

/// Provenance tag that makes a reference answer mandatory.
pub const MATH_SOURCE_TAG: &str = "PromptCoT-Math";

/// A single stdin/expected-stdout pair for a code item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Text supplied on stdin.
    pub input: String,
    /// Expected stdout.
    pub output: String,
}

/// Outcome of checking one completion against an item's tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pass,
    Fail,
    Timeout,
}

impl TestOutcome {
    /// Returns true for `Pass`.
    pub fn is_pass(self) -> bool {
        matches!(self, TestOutcome::Pass)
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestOutcome::Pass => "pass",
            TestOutcome::Fail => "fail",
            TestOutcome::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Quality verdict over a synthesized rationale+problem artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Perfect,
    Acceptable,
    Bad,
}

impl Verdict {
    /// Verdicts that gate an item into the self-play stage.
    pub fn is_retained(self) -> bool {
        matches!(self, Verdict::Perfect | Verdict::Acceptable)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Perfect => "perfect",
            Verdict::Acceptable => "acceptable",
            Verdict::Bad => "bad",
        };
        f.write_str(s)
    }
}

impl FromStr for Verdict {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "perfect" => Ok(Verdict::Perfect),
            "acceptable" => Ok(Verdict::Acceptable),
            "bad" => Ok(Verdict::Bad),
            _ => Err(()),
        }
    }
}

/// Verification mode for self-play items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EvalType {
    Code,
    Math,
}

/// An item produced by the concept sampler and filled in by the
/// generation and judgement stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisItem {
    /// Opaque item identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Sampled concept tuple; position 0 is the seed concept.
    pub concept_tuple: Vec<String>,

    /// Target difficulty level for the generated problem.
    pub difficulty: String,

    /// Design rationale, filled by the generation stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    /// Problem statement, filled by the generation stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,

    /// Quality verdict, stamped by the judgement stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judgement: Option<Verdict>,

    /// Keys this stage does not interpret, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SynthesisItem {
    /// Creates a fresh item for a sampled tuple with a generated id.
    pub fn new(concept_tuple: Vec<String>, difficulty: impl Into<String>) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            concept_tuple,
            difficulty: difficulty.into(),
            rationale: None,
            problem: None,
            judgement: None,
            extra: Map::new(),
        }
    }
}

/// A generic record for the batched (single-completion) inference driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptItem {
    /// Opaque item identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Prompt text submitted to the engine.
    pub prompt: String,

    /// Completion produced for this prompt, one per item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,

    /// Keys this stage does not interpret, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PromptItem {
    /// Creates an item from a bare prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            prompt: prompt.into(),
            completion: None,
            extra: Map::new(),
        }
    }
}

/// A record for the self-play inference driver and the verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfPlayItem {
    /// Opaque item identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Prompt text submitted to the engine.
    pub prompt: String,

    /// Provenance tag; `PromptCoT-Math` requires a reference answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Reference answer, present for math items when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    /// I/O test cases, present for code items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<Vec<TestCase>>,

    /// Completions accumulated across self-play passes.
    #[serde(default)]
    pub completions: Vec<String>,

    /// Set once any completion has been verified; never flipped back.
    #[serde(default)]
    pub solved: bool,

    /// One outcome per completion, or empty if the item was never verified.
    #[serde(default)]
    pub test_results: Vec<TestOutcome>,

    /// Set to -3 when the global per-item verification budget was breached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,

    /// Keys this stage does not interpret, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SelfPlayItem {
    /// Creates an item from a bare prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            prompt: prompt.into(),
            source: None,
            answer: None,
            test_cases: None,
            completions: Vec::new(),
            solved: false,
            test_results: Vec::new(),
            error_code: None,
            extra: Map::new(),
        }
    }

    /// Returns the item id or a placeholder for log messages.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<unnamed>")
    }

    /// Checks item-level input invariants for the given verification mode.
    ///
    /// `PromptCoT-Math` items must carry a reference answer; code items must
    /// carry at least one test case.
    pub fn validate(&self, eval_type: EvalType) -> Result<(), DataError> {
        if self.source.as_deref() == Some(MATH_SOURCE_TAG) && self.answer.is_none() {
            return Err(DataError::MissingReferenceAnswer(
                self.display_id().to_string(),
            ));
        }
        if eval_type == EvalType::Code
            && self.test_cases.as_ref().is_none_or(|cases| cases.is_empty())
        {
            return Err(DataError::MissingTestCases(self.display_id().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TestOutcome::Timeout).unwrap(),
            "\"timeout\""
        );
        assert_eq!(
            serde_json::from_str::<TestOutcome>("\"pass\"").unwrap(),
            TestOutcome::Pass
        );
    }

    #[test]
    fn verdict_round_trips_through_str() {
        for v in [Verdict::Perfect, Verdict::Acceptable, Verdict::Bad] {
            assert_eq!(v.to_string().parse::<Verdict>().unwrap(), v);
        }
        assert!("great".parse::<Verdict>().is_err());
    }

    #[test]
    fn self_play_item_preserves_unknown_keys() {
        let raw = r#"{"prompt": "p", "custom_field": 7, "nested": {"a": 1}}"#;
        let item: SelfPlayItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.extra.get("custom_field"), Some(&serde_json::json!(7)));

        let out = serde_json::to_value(&item).unwrap();
        assert_eq!(out.get("nested"), Some(&serde_json::json!({"a": 1})));
    }

    #[test]
    fn math_source_requires_reference_answer() {
        let mut item = SelfPlayItem::new("solve");
        item.id = Some("m-1".to_string());
        item.source = Some(MATH_SOURCE_TAG.to_string());
        assert!(matches!(
            item.validate(EvalType::Math),
            Err(DataError::MissingReferenceAnswer(id)) if id == "m-1"
        ));

        item.answer = Some("42".to_string());
        assert!(item.validate(EvalType::Math).is_ok());
    }

    #[test]
    fn code_items_require_test_cases() {
        let mut item = SelfPlayItem::new("write code");
        assert!(matches!(
            item.validate(EvalType::Code),
            Err(DataError::MissingTestCases(_))
        ));

        item.test_cases = Some(vec![TestCase {
            input: "1\n".to_string(),
            output: "1\n".to_string(),
        }]);
        assert!(item.validate(EvalType::Code).is_ok());
    }
}
