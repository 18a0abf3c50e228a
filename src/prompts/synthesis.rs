//! Rationale+problem generation prompt and artifact parser.

/// Sentinel preceding the final full answer in generation output.
pub const THINKING_SENTINEL: &str = "Thinking Process:";

/// Opening delimiter of the rationale section.
pub const RATIONALE_BEGIN: &str = "<!-- BEGIN RATIONALE -->";
/// Closing delimiter of the rationale section.
pub const RATIONALE_END: &str = "<!-- END RATIONALE -->";
/// Opening delimiter of the problem section.
pub const PROBLEM_BEGIN: &str = "<!-- BEGIN PROBLEM -->";
/// Closing delimiter of the problem section.
pub const PROBLEM_END: &str = "<!-- END PROBLEM -->";

/// Rationale and problem extracted from a generation completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisArtifact {
    pub rationale: Option<String>,
    pub problem: Option<String>,
}

impl SynthesisArtifact {
    /// True when both sections were found.
    pub fn is_complete(&self) -> bool {
        self.rationale.is_some() && self.problem.is_some()
    }
}

/// Builds the rationale+problem generation prompt for a concept tuple and a
/// target difficulty level.
pub fn build_synthesis_prompt(concepts: &[String], difficulty: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are designing a new problem from foundational concepts.\n\
         Given the following concepts and a target difficulty level, produce a \
         step-by-step design rationale explaining how the concepts compose into \
         a problem, followed by a single self-contained problem statement.\n\n",
    );

    prompt.push_str("Foundational concepts:\n");
    for (i, concept) in concepts.iter().enumerate() {
        prompt.push_str(&format!("{}. {concept}\n", i + 1));
    }
    prompt.push_str(&format!("\nTarget difficulty level: {difficulty}\n\n"));

    prompt.push_str(&format!(
        "Delimit the two sections exactly as:\n\
         {RATIONALE_BEGIN} ... {RATIONALE_END}\n\
         {PROBLEM_BEGIN} ... {PROBLEM_END}\n\n\
         Emit the final full answer after the sentinel `{THINKING_SENTINEL} `.\n"
    ));
    prompt
}

/// Returns the text after the last occurrence of `sentinel`, trimmed.
///
/// If the sentinel is absent the full text is returned, so a completion that
/// skipped the thinking preamble still parses.
pub fn extract_after<'t>(sentinel: &str, text: &'t str) -> &'t str {
    match text.rfind(sentinel) {
        Some(pos) => text[pos + sentinel.len()..].trim(),
        None => text.trim(),
    }
}

/// Extracts the rationale and problem sections from generation output.
///
/// The scan runs on the text after the last `Thinking Process:` sentinel and
/// takes the first delimited span of each section. Missing delimiters leave
/// the corresponding field `None`; they are never fatal.
pub fn parse_artifact(text: &str) -> SynthesisArtifact {
    let body = extract_after(THINKING_SENTINEL, text);
    SynthesisArtifact {
        rationale: between(body, RATIONALE_BEGIN, RATIONALE_END),
        problem: between(body, PROBLEM_BEGIN, PROBLEM_END),
    }
}

fn between(text: &str, begin: &str, end: &str) -> Option<String> {
    let start = text.find(begin)? + begin.len();
    let rel_end = text[start..].find(end)?;
    Some(text[start..start + rel_end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_concepts_and_difficulty() {
        let concepts = vec!["modular arithmetic".to_string(), "recursion".to_string()];
        let prompt = build_synthesis_prompt(&concepts, "olympiad");

        assert!(prompt.contains("1. modular arithmetic"));
        assert!(prompt.contains("2. recursion"));
        assert!(prompt.contains("Target difficulty level: olympiad"));
        assert!(prompt.contains(RATIONALE_BEGIN));
        assert!(prompt.contains(THINKING_SENTINEL));
    }

    #[test]
    fn extract_after_takes_last_occurrence() {
        let text = "Thinking Process: draft\nmore\nThinking Process: final answer";
        assert_eq!(extract_after(THINKING_SENTINEL, text), "final answer");
    }

    #[test]
    fn extract_after_falls_back_to_full_text() {
        assert_eq!(extract_after(THINKING_SENTINEL, "  no sentinel here "), "no sentinel here");
    }

    #[test]
    fn parses_complete_artifact() {
        let text = format!(
            "Let me think.\n{THINKING_SENTINEL} \n\
             {RATIONALE_BEGIN}\nCombine the concepts.\n{RATIONALE_END}\n\
             {PROBLEM_BEGIN}\nProve that 1 + 1 = 2.\n{PROBLEM_END}\n"
        );
        let artifact = parse_artifact(&text);
        assert!(artifact.is_complete());
        assert_eq!(artifact.rationale.as_deref(), Some("Combine the concepts."));
        assert_eq!(artifact.problem.as_deref(), Some("Prove that 1 + 1 = 2."));
    }

    #[test]
    fn missing_delimiters_are_not_fatal() {
        let artifact = parse_artifact("no delimiters at all");
        assert_eq!(artifact.rationale, None);
        assert_eq!(artifact.problem, None);
        assert!(!artifact.is_complete());
    }

    #[test]
    fn partial_artifact_keeps_present_section() {
        let text = format!("{PROBLEM_BEGIN} Just a problem. {PROBLEM_END}");
        let artifact = parse_artifact(&text);
        assert_eq!(artifact.rationale, None);
        assert_eq!(artifact.problem.as_deref(), Some("Just a problem."));
    }
}
