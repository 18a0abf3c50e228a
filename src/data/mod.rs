//! On-disk data model for the synthesis pipeline.
//!
//! Every stage reads and writes line-delimited JSON. Records are open-schema:
//! each stage adds or overwrites a declared subset of keys and carries all
//! other keys through untouched.

mod jsonl;
mod records;

pub use jsonl::{read_jsonl, write_jsonl};
pub use records::{
    EvalType, PromptItem, SelfPlayItem, SynthesisItem, TestCase, TestOutcome, Verdict,
    MATH_SOURCE_TAG,
};
