//! Answer text post-processing.

use regex::Regex;
use std::sync::LazyLock;

static BRACKET_CITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\[\s*cite\s*:\s*[0-9\s,]+\s*\]\s*").expect("valid bracket cite regex")
});
static COMMA_CITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*,\s*cite\s*:\s*[0-9\s,]+\s*").expect("valid comma cite regex")
});
static BARE_CITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\bcite\s*:\s*[0-9\s,]+\s*").expect("valid bare cite regex")
});
static HORIZONTAL_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid horizontal space regex"));
static TRAILING_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("valid trailing space regex"));
static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank lines regex"));
static DISCOURSE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([.!?…:])\s+(כדי להמחיש זאת)").expect("valid discourse marker regex")
});

/// Prefix length used by [`duplicate_prefix_count`].
const DUPLICATE_PREFIX_CHARS: usize = 80;

/// Prefixes shorter than this are too generic to count.
const DUPLICATE_PREFIX_MIN_CHARS: usize = 24;

/// Remove `[cite: 1, 2]` markers and their bare variants.
pub fn strip_cite_markers(text: &str) -> String {
    let text = BRACKET_CITE_RE.replace_all(text, " ");
    let text = COMMA_CITE_RE.replace_all(&text, " ");
    let text = BARE_CITE_RE.replace_all(&text, " ");
    let text = HORIZONTAL_SPACE_RE.replace_all(&text, " ");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    text.replace(" \n", "\n").trim().to_string()
}

/// Normalize line endings and paragraph breaks of a final answer.
pub fn normalize_answer_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = TRAILING_SPACE_RE.replace_all(&text, "\n");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    let text = DISCOURSE_MARKER_RE.replace_all(&text, "${1}\n\n${2}");
    text.trim().to_string()
}

/// Number of bracketed cite markers in `text`.
pub fn inline_cite_count(text: &str) -> usize {
    BRACKET_CITE_RE.find_iter(text).count()
}

/// How many times the opening of `text` recurs in it.
///
/// Verbatim self-repetition shows up as a count above 1. Returns 0 when the
/// text is too short to judge.
pub fn duplicate_prefix_count(text: &str) -> usize {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }

    let norm = text.replace("\r\n", "\n");
    let norm = HORIZONTAL_SPACE_RE.replace_all(&norm, " ");
    let norm = BLANK_LINES_RE.replace_all(&norm, "\n\n");
    let norm = norm.trim();

    let prefix: String = norm.chars().take(DUPLICATE_PREFIX_CHARS).collect();
    let prefix = prefix.trim();
    if prefix.chars().count() < DUPLICATE_PREFIX_MIN_CHARS {
        return 0;
    }

    norm.matches(prefix).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_cite_markers_removes_all_variants() {
        let raw = "Utilitarianism maximizes welfare [cite: 1, 2, 3]. Kant disagrees, cite: 4,5 \
                   and Rawls cite: 6 too.";
        let cleaned = strip_cite_markers(raw);

        assert!(!cleaned.to_lowercase().contains("cite"));
        assert_eq!(
            cleaned,
            "Utilitarianism maximizes welfare . Kant disagrees and Rawls too."
        );
    }

    #[test]
    fn test_strip_cite_markers_keeps_paragraphs() {
        let cleaned = strip_cite_markers("first\n\n\n\nsecond  line \nthird [cite: 1]");
        assert_eq!(cleaned, "first\n\nsecond line\nthird");
    }

    #[test]
    fn test_normalize_answer_text() {
        let text = "שורה  \r\nשנייה\n\n\n\nשלישית. כדי להמחיש זאת, דוגמה.";
        assert_eq!(
            normalize_answer_text(text),
            "שורה\nשנייה\n\nשלישית.\n\nכדי להמחיש זאת, דוגמה."
        );
    }

    #[test]
    fn test_inline_cite_count() {
        assert_eq!(inline_cite_count("a [cite: 1] b [ CITE : 2, 3 ] c cite: 4"), 2);
        assert_eq!(inline_cite_count(""), 0);
    }

    #[test]
    fn test_duplicate_prefix_count() {
        let paragraph = "תועלתנות היא גישה אתית שמודדת מעשים לפי התוצאות שלהם, \
                         ובמיוחד לפי סך האושר שהם מייצרים לכלל המושפעים.";
        let repeated = format!("{}\n\n{}\n\n{}", paragraph, paragraph, paragraph);

        assert_eq!(duplicate_prefix_count(&repeated), 3);
        assert_eq!(duplicate_prefix_count(paragraph), 1);
        assert_eq!(duplicate_prefix_count("short answer"), 0);
        assert_eq!(duplicate_prefix_count(""), 0);
    }
}
