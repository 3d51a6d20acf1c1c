use std::sync::LazyLock;

use regex::Regex;

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").unwrap());

/// Normalise extracted text before splitting.
///
/// Blank-line runs collapse to a single newline, every line is trimmed,
/// runs of spaces shrink to one space and the result is trimmed.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let collapsed = BLANK_LINES.replace_all(text, "\n");
    let trimmed_lines = collapsed
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    SPACE_RUNS
        .replace_all(&trimmed_lines, " ")
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_blank_lines() {
        assert_eq!(clean_text("a\n\n\nb"), "a\nb");
        assert_eq!(clean_text("a\n  \n\t\nb"), "a\nb");
    }

    #[test]
    fn trims_lines_and_spaces() {
        assert_eq!(clean_text("  a   b  \n  c "), "a b\nc");
    }

    #[test]
    fn empty_and_whitespace_only() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text(" \n \n "), "");
    }

    #[test]
    fn keeps_single_newlines() {
        assert_eq!(clean_text("line one\nline two"), "line one\nline two");
    }

    #[test]
    fn tabs_inside_line_are_kept() {
        assert_eq!(clean_text("a\tb"), "a\tb");
    }
}
