//! Response normalization.
//!
//! Turns one raw generation response into a [`ParsedResponse`]: the answer
//! text, a de-duplicated reference list and the evidence statistics.
//!
//! Answer extraction prefers, in order:
//! 1. the `answer` field of a JSON object embedded in the text
//! 2. an inline `answer: "..."` pattern
//! 3. a labeled Hebrew answer line (`תשובה: ...`)
//! 4. the full text minus reasoning/meta lines
//!
//! References come from the JSON `references` field when present, otherwise
//! from the retrieved chunks of the grounding metadata.

use crate::cleanup::strip_cite_markers;
use crate::types::{GroundingStats, ParsedResponse, Reference};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use tutor_llm::{GenerateResponse, RetrievedContext};
use tutor_prompt::NOT_FOUND_SENTINEL;

static NOT_FOUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^{}[\s.!?]*$", NOT_FOUND_SENTINEL)).expect("valid not found regex")
});

static INLINE_ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)[`"]?answer[`"]?\s*[:=]\s*["“]([\s\S]*?)["”]"#)
        .expect("valid inline answer regex")
});

static LABELED_ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:תשובה|מענה)\s*[:\-]\s*([^\n]+)").expect("valid labeled answer regex")
});

static META_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(analyze|synthesize|format|final review|create the json|json structure|step)\b")
        .expect("valid meta line regex")
});

static WEEK_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:(?:^|[^\p{L}])(?:week|wk|lecture|w)|שבוע)[\s_\-]*0*(\d{1,2})")
        .expect("valid week marker regex")
});

static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\p{L}\p{N}_\-\.]+\.(pdf|docx|pptx|xlsx|txt|doc|ppt)")
        .expect("valid file name regex")
});

static PAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)---\s*PAGE\s*(\d{1,4})\s*---").expect("valid page marker regex")
});

/// Maximum quote length in characters before truncation.
pub const MAX_QUOTE_CHARS: usize = 180;

/// Normalize one generation response.
pub fn parse_response(response: &GenerateResponse) -> ParsedResponse {
    let raw_text = response.text();
    let mut answer = raw_text.clone();
    let mut references = Vec::new();
    let mut not_found = is_not_found(&raw_text);

    let json_block = extract_json_block(&raw_text);
    if let Some(value) = json_block.and_then(|b| serde_json::from_str::<Value>(b).ok()) {
        if let Some(json_answer) = value
            .get("answer")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            not_found = not_found || is_not_found(json_answer);
            answer = json_answer.to_string();
        }
        if let Some(items) = value.get("references").and_then(Value::as_array) {
            references = format_citations(items);
        }
    }

    if json_block.is_none() || answer.is_empty() || answer == raw_text {
        let extracted = extract_answer_from_text(&raw_text);
        if !extracted.is_empty() {
            answer = extracted;
        }
    }

    let answer = strip_cite_markers(&answer);

    if references.is_empty() {
        references = grounding_references(response);
    }

    ParsedResponse {
        answer,
        references,
        grounding: grounding_stats(response, &raw_text),
        not_found,
        finish_reason: response.finish_reason().to_string(),
        usage: response.usage_metadata.clone(),
        raw_text,
    }
}

/// Whether the text is the not-found sentinel, allowing trailing punctuation.
pub fn is_not_found(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && NOT_FOUND_RE.is_match(text)
}

/// Span from the first `{` to the last `}`.
fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Free-text answer heuristics.
fn extract_answer_from_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    if let Some(m) = INLINE_ANSWER_RE.captures(text).and_then(|c| c.get(1)) {
        return m.as_str().trim().to_string();
    }

    if let Some(m) = LABELED_ANSWER_RE.captures(text).and_then(|c| c.get(1)) {
        return m.as_str().trim().to_string();
    }

    let normalized = text.replace("\r\n", "\n");
    let mut collapsed: Vec<&str> = Vec::new();
    let mut last_blank = true;

    for line in normalized.split('\n') {
        let trimmed = line.trim();
        if META_LINE_RE.is_match(trimmed) {
            continue;
        }
        if trimmed.is_empty() {
            if !last_blank {
                collapsed.push("");
            }
            last_blank = true;
            continue;
        }
        collapsed.push(trimmed);
        last_blank = false;
    }

    collapsed.join("\n").trim().to_string()
}

/// Week label ("שבוע NN") inferred from a source name or quote.
pub fn infer_week(text: &str) -> Option<String> {
    WEEK_MARKER_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|n| format!("שבוע {:02}", n))
}

fn extract_file_name(text: &str) -> Option<&str> {
    FILE_NAME_RE.find(text).map(|m| m.as_str())
}

/// First label candidate, preferring an embedded file name.
fn pick_source_label(context: &RetrievedContext) -> Option<String> {
    context.label_candidates().next().map(|candidate| {
        extract_file_name(candidate)
            .unwrap_or(candidate.trim())
            .to_string()
    })
}

fn extract_page_marker(text: &str) -> Option<&str> {
    PAGE_MARKER_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn truncate_quote(quote: &str) -> String {
    if quote.chars().count() <= MAX_QUOTE_CHARS {
        return quote.to_string();
    }
    let head: String = quote.chars().take(MAX_QUOTE_CHARS).collect();
    format!("{}…", head.trim_end())
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// References from retrieved chunks, de-duplicated by (week, part).
pub fn grounding_references(response: &GenerateResponse) -> Vec<Reference> {
    let Some(metadata) = response.grounding() else {
        return Vec::new();
    };

    let fallback = RetrievedContext::default();
    let references = metadata.grounding_chunks.iter().filter_map(|chunk| {
        let context = chunk.retrieved_context.as_ref().unwrap_or(&fallback);

        let store = context
            .file_search_store
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        let source = pick_source_label(context).unwrap_or_else(|| store.to_string());

        let raw_quote = context.text.as_deref().map(str::trim).unwrap_or_default();
        let quote = truncate_quote(raw_quote);

        let part = match (source.is_empty(), extract_page_marker(raw_quote)) {
            (true, _) => String::new(),
            (false, Some(page)) => format!("{} p.{}", source, page),
            (false, None) => source.clone(),
        };

        if part.is_empty() && quote.is_empty() {
            return None;
        }

        let week = infer_week(&source).or_else(|| infer_week(&quote));
        Some(Reference::new(week, non_empty(part), non_empty(quote)))
    });

    let mut seen = HashSet::new();
    references
        .filter(|r| seen.insert((r.week.clone(), r.part.clone())))
        .collect()
}

/// Normalize a citation given as a bare string or an object.
pub fn normalize_citation(item: &Value) -> Option<Reference> {
    let field = |name: &str| {
        item.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match item {
        Value::Null => None,
        Value::String(s) => {
            let label = s.trim();
            (!label.is_empty()).then(|| Reference {
                label: label.to_string(),
                week: None,
                part: None,
                quote: None,
            })
        }
        Value::Object(_) => {
            let label = field("label");
            let part = field("part");
            let quote = field("quote");
            let week = field("week").or_else(|| {
                let source = format!(
                    "{} {}",
                    label.as_deref().unwrap_or_default(),
                    part.as_deref().unwrap_or_default()
                );
                infer_week(&source)
            });

            let mut reference = Reference::new(week, part, quote);
            if let Some(label) = label {
                reference.label = label;
            }
            Some(reference)
        }
        other => {
            let label = other.to_string();
            (!label.is_empty()).then(|| Reference {
                label,
                week: None,
                part: None,
                quote: None,
            })
        }
    }
}

/// Normalize and de-duplicate citations by label and quote.
pub fn format_citations(items: &[Value]) -> Vec<Reference> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(normalize_citation)
        .filter(|r| seen.insert((r.label.clone(), r.quote.clone())))
        .collect()
}

/// Chunk and support counts plus character coverage of `raw_text`.
pub fn grounding_stats(response: &GenerateResponse, raw_text: &str) -> GroundingStats {
    let Some(metadata) = response.grounding() else {
        return GroundingStats::default();
    };

    let chunks_count = metadata.grounding_chunks.len();
    let supports_count = metadata.grounding_supports.len();
    let text_len = raw_text.chars().count();

    let ranges: Vec<(i64, i64)> = metadata
        .grounding_supports
        .iter()
        .filter_map(|support| support.segment.as_ref())
        .filter_map(|segment| Some((segment.start_index.unwrap_or(0), segment.end_index?)))
        .collect();

    let supported_chars = supported_chars(&ranges, text_len);
    let coverage = if text_len == 0 {
        0.0
    } else {
        supported_chars as f64 / text_len as f64
    };

    GroundingStats {
        chunks_count,
        supports_count,
        supported_chars,
        coverage,
    }
}

/// Length of the union of `ranges` after clipping them to `[0, text_len)`.
///
/// Empty and inverted ranges are ignored; overlapping and adjacent ranges
/// are merged so no character is counted twice.
pub fn supported_chars(ranges: &[(i64, i64)], text_len: usize) -> usize {
    let len = text_len as i64;
    let mut clipped: Vec<(i64, i64)> = ranges
        .iter()
        .filter(|(start, end)| end > start)
        .map(|&(start, end)| (start.clamp(0, len), end.clamp(0, len)))
        .filter(|(start, end)| end > start)
        .collect();

    clipped.sort_unstable();

    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(clipped.len());
    for (start, end) in clipped {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    merged.iter().map(|(start, end)| (end - start) as usize).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_answer_and_references() {
        let raw = r#"Here you go: {"answer": "Kant focuses on duty [cite: 1].", "references": [
            {"label": "Week03_Kant.pdf", "quote": "duty"},
            {"label": "Week03_Kant.pdf", "quote": "duty"},
            "syllabus.pdf"
        ]}"#;
        let parsed = parse_response(&GenerateResponse::from_text(raw));

        assert_eq!(parsed.answer, "Kant focuses on duty .");
        assert_eq!(parsed.references.len(), 2);
        assert_eq!(parsed.references[0].week.as_deref(), Some("שבוע 03"));
        assert_eq!(parsed.references[0].label, "Week03_Kant.pdf");
        assert_eq!(parsed.references[1].label, "syllabus.pdf");
        assert!(!parsed.not_found);
    }

    #[test]
    fn test_not_found_variants() {
        for raw in ["NOT_FOUND", "not_found.", "NOT_FOUND!\n", r#"{"answer": "NOT_FOUND"}"#] {
            let parsed = parse_response(&GenerateResponse::from_text(raw));
            assert!(parsed.not_found, "{}", raw);
        }
        assert!(!is_not_found("NOT_FOUND in the slides, but..."));
        assert!(!is_not_found(""));
    }

    #[test]
    fn test_inline_answer_pattern() {
        let raw = "answer: \"תועלתנות מודדת תוצאות\" and more";
        let parsed = parse_response(&GenerateResponse::from_text(raw));
        assert_eq!(parsed.answer, "תועלתנות מודדת תוצאות");
    }

    #[test]
    fn test_labeled_hebrew_answer() {
        let raw = "ניתוח קצר\nתשובה: קאנט מדגיש חובה.\nעוד שורה";
        let parsed = parse_response(&GenerateResponse::from_text(raw));
        assert_eq!(parsed.answer, "קאנט מדגיש חובה.");
    }

    #[test]
    fn test_meta_lines_filtered_and_blank_lines_collapsed() {
        let raw = "Step 1: analyze the question\nRawls proposes the veil of ignorance.  \n\n\n\nIt ensures fairness.";
        let parsed = parse_response(&GenerateResponse::from_text(raw));
        assert_eq!(
            parsed.answer,
            "Rawls proposes the veil of ignorance.\n\nIt ensures fairness."
        );
        assert_eq!(parsed.raw_text, raw);
    }

    #[test]
    fn test_grounding_references_from_chunks() {
        let long_quote = format!("--- PAGE 4 --- {}", "א".repeat(200));
        let response = GenerateResponse::from_text("answer text")
            .with_chunk(RetrievedContext::titled("fileSearchStores/x/Week03_Kant.pdf", long_quote))
            .with_chunk(RetrievedContext {
                display_name: Some("Lecture 5 slides".to_string()),
                text: Some("quote".to_string()),
                ..RetrievedContext::default()
            })
            .with_chunk(RetrievedContext::default());

        let references = grounding_references(&response);
        assert_eq!(references.len(), 2);

        let first = &references[0];
        assert_eq!(first.part.as_deref(), Some("Week03_Kant.pdf p.4"));
        assert_eq!(first.week.as_deref(), Some("שבוע 03"));
        assert_eq!(first.label, "שבוע 03 - Week03_Kant.pdf p.4");
        let quote = first.quote.as_deref().unwrap();
        assert_eq!(quote.chars().count(), MAX_QUOTE_CHARS + 1);
        assert!(quote.ends_with('…'));

        assert_eq!(references[1].week.as_deref(), Some("שבוע 05"));
        assert_eq!(references[1].part.as_deref(), Some("Lecture 5 slides"));
    }

    #[test]
    fn test_references_deduplicated_by_week_and_part() {
        let response = GenerateResponse::from_text("a")
            .with_chunk(RetrievedContext::titled("Week02_Intro.pdf", "first quote"))
            .with_chunk(RetrievedContext::titled("Week02_Intro.pdf", "second quote"));

        let references = grounding_references(&response);
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].quote.as_deref(), Some("first quote"));
    }

    #[test]
    fn test_store_name_used_when_no_label() {
        let response = GenerateResponse::from_text("a").with_chunk(RetrievedContext {
            file_search_store: Some(" fileSearchStores/course ".to_string()),
            ..RetrievedContext::default()
        });

        let references = grounding_references(&response);
        assert_eq!(references[0].part.as_deref(), Some("fileSearchStores/course"));
        assert_eq!(references[0].quote, None);
    }

    #[test]
    fn test_coverage_merges_overlapping_supports() {
        let text = "x".repeat(50);
        let response = GenerateResponse::from_text(text.clone())
            .with_support(0, 50)
            .with_support(0, 50)
            .with_support(10, 30);

        let stats = grounding_stats(&response, &text);
        assert_eq!(stats.supports_count, 3);
        assert_eq!(stats.supported_chars, 50);
        assert_eq!(stats.coverage, 1.0);
    }

    #[test]
    fn test_supported_chars_clips_and_skips_invalid() {
        assert_eq!(supported_chars(&[(-5, 3), (8, 200), (7, 7), (9, 4)], 10), 5);
        assert_eq!(supported_chars(&[(0, 2), (2, 4)], 10), 4);
        assert_eq!(supported_chars(&[], 10), 0);
        assert_eq!(supported_chars(&[(0, 5)], 0), 0);
    }

    #[test]
    fn test_coverage_counts_characters_not_bytes() {
        let text = "שלום עולם";
        let response = GenerateResponse::from_text(text).with_support(0, 4);
        let stats = grounding_stats(&response, text);
        assert!((stats.coverage - 4.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_start_index_means_zero() {
        let mut response = GenerateResponse::from_text("abcdefghij").with_support(0, 5);
        if let Some(metadata) = response.candidates[0].grounding_metadata.as_mut() {
            metadata.grounding_supports[0]
                .segment
                .as_mut()
                .unwrap()
                .start_index = None;
        }

        let stats = grounding_stats(&response, "abcdefghij");
        assert!((stats.coverage - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_infer_week_needs_marker_start() {
        assert_eq!(infer_week("Ethics_Week07_Rawls.pdf").as_deref(), Some("שבוע 07"));
        assert_eq!(infer_week("midweek 2 handout.pdf"), None);
        assert_eq!(infer_week("slideshow 3"), None);
    }

    #[test]
    fn test_normalize_citation_shapes() {
        assert_eq!(normalize_citation(&json!("  ")), None);
        assert_eq!(normalize_citation(&Value::Null), None);

        let from_part = normalize_citation(&json!({"part": "week_04 slides"})).unwrap();
        assert_eq!(from_part.week.as_deref(), Some("שבוע 04"));
        assert_eq!(from_part.label, "שבוע 04 - week_04 slides");

        let numeric = normalize_citation(&json!(7)).unwrap();
        assert_eq!(numeric.label, "7");
    }
}
