//! Grounding verdicts.
//!
//! A [`GroundingDecision`] is a pure function of one [`ParsedResponse`] and,
//! for definition questions, of the term the question asked about.

use crate::types::{GroundingStatus, ParsedResponse};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tutor_core::config::GroundingOverrides;

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("valid non-word regex"));

/// Minimum supporting-span coverage for a strong verdict.
pub const MIN_COVERAGE: f64 = 0.08;

/// Supporting spans that make a verdict strong regardless of coverage.
pub const MIN_SUPPORTS_WITHOUT_COVERAGE: usize = 2;

/// Coverage lead a filtered candidate needs over the current selection.
pub const SELECTION_MARGIN: f64 = 0.05;

/// Share of a definition term's tokens that must appear in the answer.
pub const TERM_COVERAGE_MIN: f64 = 0.8;

pub const UNFILTERED_TOP_K: u32 = 10;
pub const SCOPED_UNFILTERED_TOP_K: u32 = 14;
pub const FILTERED_TOP_K: u32 = 8;
pub const SCOPED_FILTERED_TOP_K: u32 = 10;

/// Minimum breadth of the rescue attempt.
pub const RESCUE_TOP_K_FLOOR: u32 = 20;

/// Tuned grounding and retrieval constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingPolicy {
    pub min_coverage: f64,
    pub min_supports_without_coverage: usize,
    pub selection_margin: f64,
    pub term_coverage_min: f64,
    pub unfiltered_top_k: u32,
    pub scoped_unfiltered_top_k: u32,
    pub filtered_top_k: u32,
    pub scoped_filtered_top_k: u32,
    pub rescue_top_k_floor: u32,
}

impl Default for GroundingPolicy {
    fn default() -> Self {
        Self {
            min_coverage: MIN_COVERAGE,
            min_supports_without_coverage: MIN_SUPPORTS_WITHOUT_COVERAGE,
            selection_margin: SELECTION_MARGIN,
            term_coverage_min: TERM_COVERAGE_MIN,
            unfiltered_top_k: UNFILTERED_TOP_K,
            scoped_unfiltered_top_k: SCOPED_UNFILTERED_TOP_K,
            filtered_top_k: FILTERED_TOP_K,
            scoped_filtered_top_k: SCOPED_FILTERED_TOP_K,
            rescue_top_k_floor: RESCUE_TOP_K_FLOOR,
        }
    }
}

impl GroundingPolicy {
    /// Defaults with configured overrides applied.
    pub fn from_overrides(overrides: &GroundingOverrides) -> Self {
        let defaults = Self::default();
        Self {
            min_coverage: overrides.min_coverage.unwrap_or(defaults.min_coverage),
            min_supports_without_coverage: overrides
                .min_supports_without_coverage
                .unwrap_or(defaults.min_supports_without_coverage),
            selection_margin: overrides
                .selection_margin
                .unwrap_or(defaults.selection_margin),
            term_coverage_min: overrides
                .term_coverage_min
                .unwrap_or(defaults.term_coverage_min),
            unfiltered_top_k: overrides
                .unfiltered_top_k
                .unwrap_or(defaults.unfiltered_top_k),
            scoped_unfiltered_top_k: overrides
                .scoped_unfiltered_top_k
                .unwrap_or(defaults.scoped_unfiltered_top_k),
            filtered_top_k: overrides.filtered_top_k.unwrap_or(defaults.filtered_top_k),
            scoped_filtered_top_k: overrides
                .scoped_filtered_top_k
                .unwrap_or(defaults.scoped_filtered_top_k),
            rescue_top_k_floor: overrides
                .rescue_top_k_floor
                .unwrap_or(defaults.rescue_top_k_floor),
        }
    }

    pub fn unfiltered_top_k(&self, scoped: bool) -> u32 {
        if scoped {
            self.scoped_unfiltered_top_k
        } else {
            self.unfiltered_top_k
        }
    }

    pub fn filtered_top_k(&self, scoped: bool) -> u32 {
        if scoped {
            self.scoped_filtered_top_k
        } else {
            self.filtered_top_k
        }
    }

    /// Rescue breadth: never narrower than the unfiltered attempt.
    pub fn rescue_top_k(&self, unfiltered_top_k: u32) -> u32 {
        unfiltered_top_k.max(self.rescue_top_k_floor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingReason {
    ModelNotFound,
    Supported,
    RetrievedWithoutSupports,
    NoRetrievalEvidence,
    TermMismatch,
}

impl GroundingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelNotFound => "model_not_found",
            Self::Supported => "supported",
            Self::RetrievedWithoutSupports => "retrieved_without_supports",
            Self::NoRetrievalEvidence => "no_retrieval_evidence",
            Self::TermMismatch => "term_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingDecision {
    pub grounded: bool,
    pub weak: bool,
    pub reason: GroundingReason,
    pub supports_count: usize,
    pub coverage: f64,
}

impl GroundingDecision {
    fn ungrounded(reason: GroundingReason, supports_count: usize, coverage: f64) -> Self {
        Self {
            grounded: false,
            weak: false,
            reason,
            supports_count,
            coverage,
        }
    }

    pub fn status(&self) -> GroundingStatus {
        match (self.grounded, self.weak) {
            (true, false) => GroundingStatus::Grounded,
            (true, true) => GroundingStatus::Weak,
            (false, _) => GroundingStatus::NotFound,
        }
    }
}

/// Verdict from evidence statistics alone.
pub fn base_decision(parsed: &ParsedResponse, policy: &GroundingPolicy) -> GroundingDecision {
    if parsed.not_found {
        return GroundingDecision::ungrounded(GroundingReason::ModelNotFound, 0, 0.0);
    }

    let supports = parsed.grounding.supports_count;
    let coverage = parsed.grounding.coverage;

    let strong = supports >= 1
        && (coverage >= policy.min_coverage || supports >= policy.min_supports_without_coverage);
    if strong {
        return GroundingDecision {
            grounded: true,
            weak: false,
            reason: GroundingReason::Supported,
            supports_count: supports,
            coverage,
        };
    }

    // Grounding metadata is sometimes missing on valid retrievals
    let has_retrieval = !parsed.references.is_empty() || parsed.grounding.chunks_count > 0;
    if has_retrieval {
        return GroundingDecision {
            grounded: true,
            weak: true,
            reason: GroundingReason::RetrievedWithoutSupports,
            supports_count: supports,
            coverage,
        };
    }

    GroundingDecision::ungrounded(GroundingReason::NoRetrievalEvidence, supports, coverage)
}

/// Score a response, downgrading it when a definition term is missing from the answer.
pub fn score(
    parsed: &ParsedResponse,
    standalone_term: Option<&str>,
    policy: &GroundingPolicy,
) -> GroundingDecision {
    let decision = base_decision(parsed, policy);

    let Some(term) = standalone_term.filter(|t| !t.trim().is_empty()) else {
        return decision;
    };
    if !decision.grounded {
        return decision;
    }

    let term_coverage = term_coverage(term, &parsed.answer);
    if term_coverage >= policy.term_coverage_min {
        return decision;
    }

    tracing::debug!(term, term_coverage, "Answer does not cover the asked term");
    GroundingDecision::ungrounded(
        GroundingReason::TermMismatch,
        decision.supports_count,
        decision.coverage,
    )
}

fn tokenize_for_match(text: &str) -> Vec<String> {
    NON_WORD_RE
        .replace_all(&text.to_lowercase(), " ")
        .split_whitespace()
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// Share of the term's distinct tokens found in `text`.
pub fn term_coverage(term: &str, text: &str) -> f64 {
    let term_tokens: HashSet<String> = tokenize_for_match(term).into_iter().collect();
    if term_tokens.is_empty() {
        return 0.0;
    }

    let text_tokens: HashSet<String> = tokenize_for_match(text).into_iter().collect();
    let covered = term_tokens.intersection(&text_tokens).count();
    covered as f64 / term_tokens.len() as f64
}
