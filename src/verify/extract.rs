//! Completion text extraction: think-prefix stripping, fenced code blocks,
//! and final math answers.

use regex::Regex;
use std::sync::OnceLock;

/// Separator between an internal-thought prefix (ignored) and the scorable
/// completion suffix.
pub const THINK_END: &str = "</think>";

/// Returns the text after the last `</think>`, or the whole text when the
/// completion carries no thought prefix.
pub fn strip_think(text: &str) -> &str {
    match text.rfind(THINK_END) {
        Some(pos) => &text[pos + THINK_END.len()..],
        None => text,
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```[a-zA-Z0-9_+\-]*\r?\n?([\s\S]*?)```").expect("static fence regex")
    })
}

/// Extracts the candidate program from a completion: the content of the last
/// fenced code block in the post-`</think>` suffix.
pub fn extract_code_block(completion: &str) -> Option<String> {
    let body = strip_think(completion);
    fence_regex()
        .captures_iter(body)
        .last()
        .map(|caps| caps[1].trim_end().to_string())
        .filter(|code| !code.trim().is_empty())
}

/// Extracts the final answer token from a math completion.
///
/// Prefers the last `\boxed{...}` span (balanced braces); otherwise falls
/// back to the last non-empty line.
pub fn extract_final_answer(completion: &str) -> Option<String> {
    let body = strip_think(completion);
    if let Some(boxed) = extract_last_boxed(body) {
        return Some(boxed);
    }
    body.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn extract_last_boxed(text: &str) -> Option<String> {
    const MARKER: &str = r"\boxed{";
    let start = text.rfind(MARKER)? + MARKER.len();

    let mut depth = 1usize;
    for (offset, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset].trim().to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_last_think_prefix() {
        assert_eq!(strip_think("<think>a</think>b</think>rest"), "rest");
        assert_eq!(strip_think("no markers"), "no markers");
    }

    #[test]
    fn extracts_last_fenced_block() {
        let completion = "First try:\n```python\nprint(1)\n```\nBetter:\n```python\nprint(2)\n```";
        assert_eq!(extract_code_block(completion).unwrap(), "print(2)");
    }

    #[test]
    fn ignores_blocks_inside_think_prefix() {
        let completion = "<think>```python\ndraft\n```</think>\n```python\nfinal\n```";
        assert_eq!(extract_code_block(completion).unwrap(), "final");
    }

    #[test]
    fn no_fences_means_no_candidate() {
        assert_eq!(extract_code_block("just prose"), None);
        assert_eq!(extract_code_block("``````"), None);
    }

    #[test]
    fn boxed_answer_wins_over_last_line() {
        let completion = "The answer is \\boxed{\\frac{1}{2}}.\nDone.";
        assert_eq!(extract_final_answer(completion).unwrap(), "\\frac{1}{2}");
    }

    #[test]
    fn boxed_handles_nested_braces() {
        let completion = r"\boxed{x_{1} + y_{2}}";
        assert_eq!(extract_final_answer(completion).unwrap(), "x_{1} + y_{2}");
    }

    #[test]
    fn falls_back_to_last_non_empty_line() {
        let completion = "Working...\n42\n\n";
        assert_eq!(extract_final_answer(completion).unwrap(), "42");
        assert_eq!(extract_final_answer("\n  \n"), None);
    }
}
