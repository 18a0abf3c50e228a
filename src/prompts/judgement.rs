//! Judgement prompt and verdict parser.

use regex::Regex;
use std::sync::OnceLock;

use crate::data::Verdict;

/// Final-line sentinel carrying the overall verdict.
pub const FINAL_JUDGEMENT_PREFIX: &str = "Final Judgement:";

/// A parsed verdict together with how it was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedVerdict {
    pub verdict: Verdict,
    /// True when the verdict came from token counting rather than a
    /// well-formed `Final Judgement:` line.
    pub via_fallback: bool,
}

/// Builds the judgement prompt over concepts, difficulty, and the generated
/// rationale+problem artifact.
pub fn build_judgement_prompt(
    concepts: &[String],
    difficulty: &str,
    rationale: &str,
    problem: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are reviewing a synthesized problem for quality.\n\n\
         Rate each of the five criteria below as `Perfect`, `Acceptable`, or `Bad`:\n\
         1. Format: the artifact is well-structured and complete.\n\
         2. Factual accuracy: every claim and definition is correct.\n\
         3. Difficulty alignment: the problem matches the target difficulty.\n\
         4. Concept coverage: the problem genuinely exercises the given concepts.\n\
         5. Solvability: the problem has a well-defined, reachable solution.\n\n",
    );

    prompt.push_str("Concepts:\n");
    for (i, concept) in concepts.iter().enumerate() {
        prompt.push_str(&format!("{}. {concept}\n", i + 1));
    }
    prompt.push_str(&format!("\nTarget difficulty level: {difficulty}\n"));
    prompt.push_str(&format!("\nDesign rationale:\n{rationale}\n"));
    prompt.push_str(&format!("\nProblem:\n{problem}\n\n"));

    prompt.push_str(&format!(
        "Then emit a final line `{FINAL_JUDGEMENT_PREFIX} <verdict>` with \
         <verdict> one of perfect, acceptable, bad, under these rules:\n\
         - perfect: factual accuracy and solvability are Perfect, at least two \
         of the other criteria are Perfect, and none is Bad.\n\
         - acceptable: no criterion is Bad and the artifact is not perfect.\n\
         - bad: any criterion is Bad.\n"
    ));
    prompt
}

fn final_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)Final Judgement:\s*(perfect|acceptable|bad)\b")
            .expect("static verdict regex")
    })
}

/// Extracts the overall verdict from judgement output.
///
/// Primary parse: the last well-formed `Final Judgement:` line, lowercased
/// and trimmed. Fallback when the line is absent: count the three verdict
/// tokens across the text and return the most frequent, ties broken by the
/// fixed priority perfect > acceptable > bad. Returns `None` when the text
/// contains no verdict token at all.
pub fn extract_final_judgement(text: &str) -> Option<ParsedVerdict> {
    if let Some(caps) = final_line_regex().captures_iter(text).last() {
        let verdict = caps[1].to_lowercase().parse::<Verdict>().ok()?;
        return Some(ParsedVerdict {
            verdict,
            via_fallback: false,
        });
    }

    let lowered = text.to_lowercase();
    // Listed in priority order; a strict comparison below keeps the earlier
    // entry on frequency ties, so perfect > acceptable > bad.
    let counts = [
        (Verdict::Perfect, lowered.matches("perfect").count()),
        (Verdict::Acceptable, lowered.matches("acceptable").count()),
        (Verdict::Bad, lowered.matches("bad").count()),
    ];
    let (verdict, count) = counts
        .into_iter()
        .fold((Verdict::Perfect, 0), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        });
    if count == 0 {
        return None;
    }
    Some(ParsedVerdict {
        verdict,
        via_fallback: true,
    })
}

/// Applies the gating policy: a fallback-recovered verdict is capped at
/// `acceptable`, since raw token frequency can be spoofed by a verbose
/// justification section.
pub fn effective_verdict(parsed: ParsedVerdict) -> Verdict {
    if parsed.via_fallback && parsed.verdict == Verdict::Perfect {
        Verdict::Acceptable
    } else {
        parsed.verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_states_rubric_and_final_line() {
        let prompt = build_judgement_prompt(
            &["algebra".to_string()],
            "intermediate",
            "rationale text",
            "problem text",
        );
        assert!(prompt.contains("Factual accuracy"));
        assert!(prompt.contains("Solvability"));
        assert!(prompt.contains(FINAL_JUDGEMENT_PREFIX));
        assert!(prompt.contains("Target difficulty level: intermediate"));
    }

    #[test]
    fn well_formed_line_wins() {
        let parsed =
            extract_final_judgement("criteria...\nFinal Judgement: Acceptable\n").unwrap();
        assert_eq!(parsed.verdict, Verdict::Acceptable);
        assert!(!parsed.via_fallback);
    }

    #[test]
    fn last_final_line_wins() {
        let text = "Final Judgement: bad\nOn reflection:\nFinal Judgement: perfect";
        let parsed = extract_final_judgement(text).unwrap();
        assert_eq!(parsed.verdict, Verdict::Perfect);
        assert!(!parsed.via_fallback);
    }

    #[test]
    fn fallback_counts_tokens() {
        // Five "Perfect" ratings, no final line.
        let text = "Rating: Perfect\n".repeat(5);
        let parsed = extract_final_judgement(&text).unwrap();
        assert_eq!(parsed.verdict, Verdict::Perfect);
        assert!(parsed.via_fallback);
    }

    #[test]
    fn fallback_ties_break_by_priority() {
        let text = "acceptable bad";
        let parsed = extract_final_judgement(text).unwrap();
        assert_eq!(parsed.verdict, Verdict::Acceptable);

        let text = "perfect acceptable bad";
        let parsed = extract_final_judgement(text).unwrap();
        assert_eq!(parsed.verdict, Verdict::Perfect);

        // A strict majority still beats a higher-priority minority.
        let text = "perfect bad bad";
        let parsed = extract_final_judgement(text).unwrap();
        assert_eq!(parsed.verdict, Verdict::Bad);
    }

    #[test]
    fn no_tokens_yields_none() {
        assert_eq!(extract_final_judgement("nothing relevant here"), None);
    }

    #[test]
    fn fallback_perfect_is_capped_at_acceptable() {
        let fallback = ParsedVerdict {
            verdict: Verdict::Perfect,
            via_fallback: true,
        };
        assert_eq!(effective_verdict(fallback), Verdict::Acceptable);

        let primary = ParsedVerdict {
            verdict: Verdict::Perfect,
            via_fallback: false,
        };
        assert_eq!(effective_verdict(primary), Verdict::Perfect);

        let fallback_bad = ParsedVerdict {
            verdict: Verdict::Bad,
            via_fallback: true,
        };
        assert_eq!(effective_verdict(fallback_bad), Verdict::Bad);
    }
}
