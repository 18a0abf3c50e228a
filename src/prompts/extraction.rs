//! Concept-extraction prompt and "Knowledge Point:" line parser.
//!
//! The line-per-concept variant is canonical: its parser is unambiguous.

/// Per-line sentinel naming one extracted concept.
pub const KNOWLEDGE_POINT_PREFIX: &str = "Knowledge Point:";

/// Builds the concept-extraction prompt for a problem statement.
///
/// The model is asked for exactly `n` lines, each of the form
/// `Knowledge Point: <concept>`, with no other text.
pub fn build_extraction_prompt(problem: &str, n: usize) -> String {
    format!(
        "Identify the foundational concepts a student must master to solve the \
         following problem.\n\nProblem:\n{problem}\n\n\
         Emit exactly {n} lines, each of the form \
         `{KNOWLEDGE_POINT_PREFIX} <concept>`, with no other text.\n"
    )
}

/// Collects every `Knowledge Point:` line, returning the trimmed substring
/// after the sentinel. Lines without the sentinel are ignored.
pub fn extract_knowledge_points(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            line.find(KNOWLEDGE_POINT_PREFIX)
                .map(|pos| line[pos + KNOWLEDGE_POINT_PREFIX.len()..].trim().to_string())
        })
        .filter(|concept| !concept.is_empty())
        .collect()
}

/// Inverse builder: one `Knowledge Point:` line per concept.
pub fn format_knowledge_points(concepts: &[String]) -> String {
    concepts
        .iter()
        .map(|c| format!("{KNOWLEDGE_POINT_PREFIX} {c}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_requests_exact_line_count() {
        let prompt = build_extraction_prompt("What is 2 + 2?", 3);
        assert!(prompt.contains("exactly 3 lines"));
        assert!(prompt.contains(KNOWLEDGE_POINT_PREFIX));
        assert!(prompt.contains("What is 2 + 2?"));
    }

    #[test]
    fn extracts_points_and_ignores_noise() {
        let text = "Here are the concepts:\n\
                    Knowledge Point: arithmetic\n\
                    (some commentary)\n\
                    - Knowledge Point: place value\n\
                    Knowledge Point:   \n";
        assert_eq!(
            extract_knowledge_points(text),
            vec!["arithmetic".to_string(), "place value".to_string()]
        );
    }

    #[test]
    fn format_then_extract_round_trips() {
        let concepts = vec![
            "graph traversal".to_string(),
            "dynamic programming".to_string(),
            "modular arithmetic".to_string(),
        ];
        let formatted = format_knowledge_points(&concepts);
        assert_eq!(extract_knowledge_points(&formatted), concepts);
    }

    #[test]
    fn empty_input_yields_no_points() {
        assert!(extract_knowledge_points("").is_empty());
        assert!(extract_knowledge_points("no sentinel anywhere").is_empty());
    }
}
