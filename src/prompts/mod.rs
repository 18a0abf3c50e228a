//! Prompt composition and output parsing for the synthesis pipeline.
//!
//! Three prompt builders and their parsers, operating on strings only:
//!
//! - [`synthesis`] - rationale+problem generation and artifact extraction
//! - [`extraction`] - concept extraction ("Knowledge Point:" lines)
//! - [`judgement`] - rubric-driven quality verdicts
//!
//! The sentinels these parsers depend on are stable and shared with the
//! on-disk format: `Thinking Process:`, the rationale/problem HTML-comment
//! delimiters, `Knowledge Point:`, and `Final Judgement:`.

pub mod extraction;
pub mod judgement;
pub mod synthesis;

pub use extraction::{
    build_extraction_prompt, extract_knowledge_points, format_knowledge_points,
    KNOWLEDGE_POINT_PREFIX,
};
pub use judgement::{
    build_judgement_prompt, effective_verdict, extract_final_judgement, ParsedVerdict,
    FINAL_JUDGEMENT_PREFIX,
};
pub use synthesis::{
    build_synthesis_prompt, extract_after, parse_artifact, SynthesisArtifact, PROBLEM_BEGIN,
    PROBLEM_END, RATIONALE_BEGIN, RATIONALE_END, THINKING_SENTINEL,
};
