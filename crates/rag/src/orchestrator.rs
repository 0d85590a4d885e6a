//! Retrieval orchestration.
//!
//! The multi-call decision procedure is a finite-state machine:
//!
//! ```text
//! Unfiltered -> [Filtered] -> [Rescue] -> Selected
//! ```
//!
//! Each state names the attempt it is waiting for. [`transition`] is a pure
//! function from a state and the candidate produced by that attempt to the
//! next state, so the policy can be tested with canned [`Candidate`]s.
//! [`RetrievalOrchestrator`] drives the machine against a live client,
//! issuing attempts strictly one after another.

use crate::cleanup::{duplicate_prefix_count, inline_cite_count};
use crate::grounding::{score, GroundingDecision, GroundingPolicy, GroundingReason};
use crate::normalize::parse_response;
use crate::types::ParsedResponse;
use serde::{Deserialize, Serialize};
use tutor_core::{AppError, AppResult};
use tutor_llm::{GenerateRequest, GenerationClient, ToolDialect};
use tutor_prompt::PromptPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Unfiltered,
    Filtered,
    Rescue,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unfiltered => "unfiltered",
            Self::Filtered => "filtered",
            Self::Rescue => "rescue",
        }
    }
}

/// One logical retrieval call. The dialect retry does not create a new attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalAttempt {
    pub kind: AttemptKind,
    pub top_k: u32,
    pub filter: Option<String>,
}

/// Breadths and filter for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalPlan {
    /// Metadata filter for the filtered attempt
    pub filter: Option<String>,

    /// The question asked for a syllabus or week scope
    pub explicit_scope: bool,

    pub unfiltered_top_k: u32,
    pub filtered_top_k: u32,
    pub rescue_top_k: u32,
}

impl RetrievalPlan {
    pub fn new(filter: Option<String>, explicit_scope: bool, policy: &GroundingPolicy) -> Self {
        let unfiltered_top_k = policy.unfiltered_top_k(explicit_scope);
        Self {
            filter: filter.filter(|f| !f.trim().is_empty()),
            explicit_scope,
            unfiltered_top_k,
            filtered_top_k: policy.filtered_top_k(explicit_scope),
            rescue_top_k: policy.rescue_top_k(unfiltered_top_k),
        }
    }

    pub fn attempt(&self, kind: AttemptKind) -> RetrievalAttempt {
        match kind {
            AttemptKind::Unfiltered => RetrievalAttempt {
                kind,
                top_k: self.unfiltered_top_k,
                filter: None,
            },
            AttemptKind::Filtered => RetrievalAttempt {
                kind,
                top_k: self.filtered_top_k,
                filter: self.filter.clone(),
            },
            AttemptKind::Rescue => RetrievalAttempt {
                kind,
                top_k: self.rescue_top_k,
                filter: None,
            },
        }
    }
}

/// A scored response of one completed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub kind: AttemptKind,
    pub parsed: ParsedResponse,
    pub decision: GroundingDecision,
}

impl Candidate {
    pub fn refs_count(&self) -> usize {
        self.parsed.references.len()
    }

    /// Strict improvement rule: ties keep `current`.
    pub fn improves_on(&self, current: &Candidate, margin: f64) -> bool {
        self.refs_count() > current.refs_count()
            || self.decision.supports_count > current.decision.supports_count
            || self.decision.coverage > current.decision.coverage + margin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorState {
    /// Waiting for the unfiltered attempt
    Unfiltered,

    /// Waiting for the filtered attempt
    Filtered { current: Candidate },

    /// Waiting for the rescue attempt
    Rescue { current: Candidate },

    /// Terminal
    Selected { selected: Candidate },
}

impl OrchestratorState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unfiltered => "unfiltered",
            Self::Filtered { .. } => "filtered",
            Self::Rescue { .. } => "rescue",
            Self::Selected { .. } => "selected",
        }
    }
}

/// The attempt the state is waiting for, if any.
pub fn pending_attempt(state: &OrchestratorState, plan: &RetrievalPlan) -> Option<RetrievalAttempt> {
    match state {
        OrchestratorState::Unfiltered => Some(plan.attempt(AttemptKind::Unfiltered)),
        OrchestratorState::Filtered { .. } => Some(plan.attempt(AttemptKind::Filtered)),
        OrchestratorState::Rescue { .. } => Some(plan.attempt(AttemptKind::Rescue)),
        OrchestratorState::Selected { .. } => None,
    }
}

/// Advance the machine with the candidate of the pending attempt.
pub fn transition(
    state: OrchestratorState,
    latest: Candidate,
    plan: &RetrievalPlan,
    policy: &GroundingPolicy,
) -> OrchestratorState {
    match state {
        OrchestratorState::Unfiltered => {
            let wants_filtered =
                plan.filter.is_some() && (plan.explicit_scope || !latest.decision.grounded);
            if wants_filtered {
                OrchestratorState::Filtered { current: latest }
            } else {
                after_selection(latest)
            }
        }
        OrchestratorState::Filtered { current } => {
            let chosen = if latest.improves_on(&current, policy.selection_margin) {
                latest
            } else {
                current
            };
            after_selection(chosen)
        }
        OrchestratorState::Rescue { current } => {
            let selected = if latest.decision.grounded {
                latest
            } else {
                current
            };
            OrchestratorState::Selected { selected }
        }
        selected @ OrchestratorState::Selected { .. } => selected,
    }
}

fn after_selection(current: Candidate) -> OrchestratorState {
    if current.decision.grounded {
        OrchestratorState::Selected { selected: current }
    } else {
        OrchestratorState::Rescue { current }
    }
}

/// Diagnostics of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptDiagnostics {
    pub kind: AttemptKind,
    pub top_k: u32,
    pub filter: Option<String>,
    pub dialect_used: ToolDialect,
    pub finish_reason: String,
    pub output_tokens: u32,
    pub thoughts_tokens: u32,
    pub refs_count: usize,
    pub supports_count: usize,
    pub coverage: f64,
    pub raw_len: usize,
    pub answer_len: usize,
    pub inline_cite_count: usize,
    pub duplicate_prefix_count: usize,
    pub grounded: bool,
    pub reason: GroundingReason,
}

impl AttemptDiagnostics {
    fn new(attempt: &RetrievalAttempt, dialect_used: ToolDialect, candidate: &Candidate) -> Self {
        let parsed = &candidate.parsed;
        Self {
            kind: attempt.kind,
            top_k: attempt.top_k,
            filter: attempt.filter.clone(),
            dialect_used,
            finish_reason: parsed.finish_reason.clone(),
            output_tokens: parsed.usage.candidates_token_count,
            thoughts_tokens: parsed.usage.thoughts_token_count,
            refs_count: candidate.refs_count(),
            supports_count: candidate.decision.supports_count,
            coverage: candidate.decision.coverage,
            raw_len: parsed.raw_text.chars().count(),
            answer_len: parsed.answer.chars().count(),
            inline_cite_count: inline_cite_count(&parsed.raw_text),
            duplicate_prefix_count: duplicate_prefix_count(&parsed.raw_text),
            grounded: candidate.decision.grounded,
            reason: candidate.decision.reason,
        }
    }
}

/// What happened during one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationTrace {
    /// Client calls, including dialect retries
    pub calls: u32,
    pub unfiltered_top_k: u32,
    pub filtered_top_k: u32,
    pub metadata_filter: Option<String>,
    pub picked: AttemptKind,
    pub attempts: Vec<AttemptDiagnostics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationResult {
    pub selected: Candidate,
    pub trace: OrchestrationTrace,
}

/// Drives [`transition`] against a generation client.
pub struct RetrievalOrchestrator<'a> {
    client: &'a dyn GenerationClient,
    policy: &'a GroundingPolicy,
}

impl<'a> RetrievalOrchestrator<'a> {
    pub fn new(client: &'a dyn GenerationClient, policy: &'a GroundingPolicy) -> Self {
        Self { client, policy }
    }

    /// Run attempts until a candidate is selected.
    ///
    /// Transport failures abort the run; they are never retried here.
    pub async fn run(
        &self,
        prompt: &PromptPayload,
        plan: &RetrievalPlan,
        standalone_term: Option<&str>,
    ) -> AppResult<OrchestrationResult> {
        let mut state = OrchestratorState::Unfiltered;
        let mut calls = 0u32;
        let mut attempts = Vec::new();

        while let Some(attempt) = pending_attempt(&state, plan) {
            let (candidate, dialect_used, attempt_calls) =
                self.run_attempt(prompt, &attempt, standalone_term).await?;
            calls += attempt_calls;

            let diagnostics = AttemptDiagnostics::new(&attempt, dialect_used, &candidate);
            tracing::info!(
                attempt = attempt.kind.as_str(),
                top_k = attempt.top_k,
                filter = attempt.filter.as_deref().unwrap_or(""),
                dialect = dialect_used.as_str(),
                chunks = candidate.parsed.grounding.chunks_count,
                supports = diagnostics.supports_count,
                coverage = diagnostics.coverage,
                grounded = diagnostics.grounded,
                reason = diagnostics.reason.as_str(),
                "Retrieval attempt finished"
            );
            attempts.push(diagnostics);

            state = transition(state, candidate, plan, self.policy);
            tracing::debug!(next = state.name(), "Orchestrator transition");
        }

        let OrchestratorState::Selected { selected } = state else {
            return Err(AppError::Other(format!(
                "Orchestration stopped in state {}",
                state.name()
            )));
        };

        let trace = OrchestrationTrace {
            calls,
            unfiltered_top_k: plan.unfiltered_top_k,
            filtered_top_k: plan.filtered_top_k,
            metadata_filter: plan.filter.clone(),
            picked: selected.kind,
            attempts,
        };
        tracing::debug!(?trace, "Orchestration trace");

        Ok(OrchestrationResult { selected, trace })
    }

    /// One logical attempt: the primary dialect, then the alternate one if
    /// the response carries no grounding evidence at all.
    async fn run_attempt(
        &self,
        prompt: &PromptPayload,
        attempt: &RetrievalAttempt,
        standalone_term: Option<&str>,
    ) -> AppResult<(Candidate, ToolDialect, u32)> {
        let mut dialect = ToolDialect::PRIMARY;
        let mut calls = 1;
        let mut response = self
            .client
            .generate(&self.request(prompt, attempt, dialect))
            .await?;

        if !response.has_grounding_evidence() {
            dialect = dialect.alternate();
            tracing::debug!(
                attempt = attempt.kind.as_str(),
                dialect = dialect.as_str(),
                "No grounding evidence, retrying with alternate tool dialect"
            );
            calls += 1;
            response = self
                .client
                .generate(&self.request(prompt, attempt, dialect))
                .await?;
        }

        let parsed = parse_response(&response);
        let decision = score(&parsed, standalone_term, self.policy);

        Ok((
            Candidate {
                kind: attempt.kind,
                parsed,
                decision,
            },
            dialect,
            calls,
        ))
    }

    fn request(
        &self,
        prompt: &PromptPayload,
        attempt: &RetrievalAttempt,
        dialect: ToolDialect,
    ) -> GenerateRequest {
        GenerateRequest::answer(&prompt.system_instruction, &prompt.user_text).with_retrieval(
            attempt.top_k,
            attempt.filter.as_deref(),
            dialect,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroundingStats, Reference};

    fn candidate(kind: AttemptKind, supports: usize, coverage: f64, refs: usize) -> Candidate {
        let parsed = ParsedResponse {
            answer: "answer".to_string(),
            references: (0..refs)
                .map(|i| Reference::new(None, Some(format!("s{}.pdf", i)), None))
                .collect(),
            grounding: GroundingStats {
                chunks_count: refs,
                supports_count: supports,
                supported_chars: 0,
                coverage,
            },
            ..ParsedResponse::default()
        };
        let decision = score(&parsed, None, &GroundingPolicy::default());
        Candidate {
            kind,
            parsed,
            decision,
        }
    }

    fn plan(filter: Option<&str>, explicit_scope: bool) -> RetrievalPlan {
        RetrievalPlan::new(
            filter.map(str::to_string),
            explicit_scope,
            &GroundingPolicy::default(),
        )
    }

    #[test]
    fn test_plan_breadths() {
        let scoped = plan(Some("week=\"03\""), true);
        assert_eq!(scoped.unfiltered_top_k, 14);
        assert_eq!(scoped.filtered_top_k, 10);
        assert_eq!(scoped.rescue_top_k, 20);

        let plain = plan(None, false);
        assert_eq!(plain.unfiltered_top_k, 10);
        assert_eq!(plain.filtered_top_k, 8);
        assert_eq!(plain.attempt(AttemptKind::Rescue).filter, None);
        assert_eq!(plan(Some("  "), false).filter, None);
    }

    #[test]
    fn test_grounded_unfiltered_without_filter_is_selected() {
        let policy = GroundingPolicy::default();
        let state = transition(
            OrchestratorState::Unfiltered,
            candidate(AttemptKind::Unfiltered, 2, 0.2, 2),
            &plan(None, false),
            &policy,
        );
        assert!(matches!(state, OrchestratorState::Selected { ref selected } if selected.kind == AttemptKind::Unfiltered));
        assert_eq!(pending_attempt(&state, &plan(None, false)), None);
    }

    #[test]
    fn test_explicit_scope_always_tries_filtered() {
        let policy = GroundingPolicy::default();
        let plan = plan(Some("week=\"03\""), true);
        let state = transition(
            OrchestratorState::Unfiltered,
            candidate(AttemptKind::Unfiltered, 2, 0.2, 2),
            &plan,
            &policy,
        );
        assert_eq!(state.name(), "filtered");

        let next = pending_attempt(&state, &plan).unwrap();
        assert_eq!(next.filter.as_deref(), Some("week=\"03\""));
        assert_eq!(next.top_k, 10);
    }

    #[test]
    fn test_unscoped_filter_only_after_ungrounded() {
        let policy = GroundingPolicy::default();
        let plan = plan(Some("type=\"slides\""), false);

        let grounded = transition(
            OrchestratorState::Unfiltered,
            candidate(AttemptKind::Unfiltered, 2, 0.2, 2),
            &plan,
            &policy,
        );
        assert_eq!(grounded.name(), "selected");

        let ungrounded = transition(
            OrchestratorState::Unfiltered,
            candidate(AttemptKind::Unfiltered, 0, 0.0, 0),
            &plan,
            &policy,
        );
        assert_eq!(ungrounded.name(), "filtered");
    }

    #[test]
    fn test_filtered_tie_keeps_unfiltered() {
        let policy = GroundingPolicy::default();
        let plan = plan(Some("week=\"03\""), true);
        let state = OrchestratorState::Filtered {
            current: candidate(AttemptKind::Unfiltered, 2, 0.20, 2),
        };

        let next = transition(
            state,
            candidate(AttemptKind::Filtered, 2, 0.24, 2),
            &plan,
            &policy,
        );
        match next {
            OrchestratorState::Selected { selected } => {
                assert_eq!(selected.kind, AttemptKind::Unfiltered)
            }
            other => panic!("unexpected state {}", other.name()),
        }
    }

    #[test]
    fn test_filtered_wins_on_margin_or_counts() {
        let policy = GroundingPolicy::default();
        let current = candidate(AttemptKind::Unfiltered, 1, 0.10, 1);

        assert!(candidate(AttemptKind::Filtered, 1, 0.16, 1).improves_on(&current, policy.selection_margin));
        assert!(candidate(AttemptKind::Filtered, 2, 0.0, 1).improves_on(&current, policy.selection_margin));
        assert!(candidate(AttemptKind::Filtered, 0, 0.0, 2).improves_on(&current, policy.selection_margin));
        assert!(!candidate(AttemptKind::Filtered, 1, 0.15, 1).improves_on(&current, policy.selection_margin));
    }

    #[test]
    fn test_ungrounded_selection_goes_to_rescue() {
        let policy = GroundingPolicy::default();
        let plan = plan(Some("week=\"03\""), true);
        let state = OrchestratorState::Filtered {
            current: candidate(AttemptKind::Unfiltered, 0, 0.0, 0),
        };

        let next = transition(state, candidate(AttemptKind::Filtered, 0, 0.0, 0), &plan, &policy);
        assert_eq!(next.name(), "rescue");
        let rescue = pending_attempt(&next, &plan).unwrap();
        assert_eq!(rescue.top_k, 20);
        assert_eq!(rescue.filter, None);
    }

    #[test]
    fn test_rescue_only_replaces_when_grounded() {
        let policy = GroundingPolicy::default();
        let plan = plan(None, false);

        let kept = transition(
            OrchestratorState::Rescue {
                current: candidate(AttemptKind::Unfiltered, 0, 0.0, 0),
            },
            candidate(AttemptKind::Rescue, 0, 0.0, 0),
            &plan,
            &policy,
        );
        assert!(matches!(kept, OrchestratorState::Selected { ref selected } if selected.kind == AttemptKind::Unfiltered));

        let replaced = transition(
            OrchestratorState::Rescue {
                current: candidate(AttemptKind::Unfiltered, 0, 0.0, 0),
            },
            candidate(AttemptKind::Rescue, 0, 0.0, 1),
            &plan,
            &policy,
        );
        assert!(matches!(replaced, OrchestratorState::Selected { ref selected } if selected.kind == AttemptKind::Rescue));
    }

    #[test]
    fn test_selected_is_terminal() {
        let policy = GroundingPolicy::default();
        let selected = OrchestratorState::Selected {
            selected: candidate(AttemptKind::Filtered, 2, 0.5, 2),
        };
        let next = transition(
            selected.clone(),
            candidate(AttemptKind::Rescue, 5, 1.0, 5),
            &plan(None, false),
            &policy,
        );
        assert_eq!(next, selected);
    }
}
