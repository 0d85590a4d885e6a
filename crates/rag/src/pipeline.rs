//! Question answering pipeline.
//!
//! One [`AskService::ask`] call handles one question end to end:
//!
//! 1. Load the session's recent turns and last grounded exchange
//! 2. Record the user turn
//! 3. Route on the classified intent; generic questions go through
//!    follow-up rewriting, prompt building and retrieval orchestration
//! 4. Record the assistant turn and one analytics event
//!
//! Generation failures never escape as errors. They are turned into a fixed
//! apology chosen by [`FailureKind`].

use crate::classifier::{prepare_question, Classification, Intent, PatternClassifier, QuestionClassifier};
use crate::cleanup::normalize_answer_text;
use crate::context::{rewrite, user_turns_for_prompt, PROMPT_USER_TURNS, RECENT_TURNS_WINDOW};
use crate::grounding::GroundingPolicy;
use crate::orchestrator::{OrchestrationTrace, RetrievalOrchestrator, RetrievalPlan};
use crate::replies;
use crate::store::{AnalyticsEvent, AnalyticsSink, ConversationStore, LastGrounded};
use crate::types::{AskOutcome, AskRequest, GroundingStatus, Reference};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tutor_core::{AppError, AppResult, ConversationTurn, FailureKind, Role};
use tutor_llm::{GenerateRequest, GenerationClient, UsageMetadata};
use tutor_prompt::{build_answer_prompt, build_greeting_prompt, PromptProfile};

/// Answer produced by one branch, before the assistant turn is recorded.
#[derive(Debug, Default)]
struct BranchAnswer {
    answer: String,
    status: Option<GroundingStatus>,
    citations: Vec<Reference>,
    finish_reason: Option<String>,
    usage: Option<UsageMetadata>,
    trace: Option<OrchestrationTrace>,
}

impl BranchAnswer {
    fn fixed(answer: &str, status: GroundingStatus) -> Self {
        Self {
            answer: answer.to_string(),
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Session state read before the user turn is appended.
struct SessionContext {
    user_turns: Vec<ConversationTurn>,
    last: Option<LastGrounded>,
}

pub struct AskService {
    client: Arc<dyn GenerationClient>,
    store: Arc<dyn ConversationStore>,
    analytics: Arc<dyn AnalyticsSink>,
    classifier: Box<dyn QuestionClassifier>,
    profile: PromptProfile,
    policy: GroundingPolicy,
}

impl AskService {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        store: Arc<dyn ConversationStore>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            client,
            store,
            analytics,
            classifier: Box::new(PatternClassifier),
            profile: PromptProfile::default(),
            policy: GroundingPolicy::default(),
        }
    }

    pub fn with_profile(mut self, profile: PromptProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_policy(mut self, policy: GroundingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn QuestionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Answer one question.
    ///
    /// Only an empty question and store failures before routing are errors.
    pub async fn ask(&self, request: AskRequest) -> AppResult<AskOutcome> {
        let started = Instant::now();
        let question = request.question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::Other("Question must not be empty".to_string()));
        }

        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let recent = self.store.recent_turns(&session_id, RECENT_TURNS_WINDOW)?;
        let session = SessionContext {
            user_turns: user_turns_for_prompt(&recent, PROMPT_USER_TURNS),
            last: self.store.last_grounded(&session_id)?,
        };

        self.store
            .append_turn(&session_id, &ConversationTurn::new(Role::User, &question))?;

        let classification = self.classifier.classify(&question);
        tracing::info!(
            session_id = %session_id,
            intent = classification.intent.as_str(),
            week = classification.signals.week.as_deref().unwrap_or(""),
            syllabus = classification.signals.syllabus,
            "Routing question"
        );

        let branch = match classification.intent {
            Intent::Greeting => self.greet(&question).await,
            Intent::OffTopicWeather => {
                BranchAnswer::fixed(replies::OFF_TOPIC_WEATHER, GroundingStatus::NotApplicable)
            }
            Intent::SourceRequest => source_reply(session.last.as_ref()),
            Intent::GroundingCheck => grounding_check_reply(session.last.as_ref()),
            Intent::Generic => {
                match self
                    .answer_from_materials(&session_id, &question, &request, &classification, &session)
                    .await
                {
                    Ok(answer) => answer,
                    Err(e) => {
                        let kind = FailureKind::classify(&e);
                        tracing::error!(session_id = %session_id, ?kind, "Answer generation failed: {}", e);
                        BranchAnswer::fixed(kind.user_message(), GroundingStatus::NotFound)
                    }
                }
            }
        };

        let answer = normalize_answer_text(&branch.answer);
        let status = branch.status.unwrap_or(GroundingStatus::NotFound);

        if let Err(e) = self
            .store
            .append_turn(&session_id, &ConversationTurn::new(Role::Assistant, &answer))
        {
            tracing::warn!(session_id = %session_id, "Failed to record assistant turn: {}", e);
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let event = AnalyticsEvent {
            session_id: session_id.clone(),
            question: question.clone(),
            grounded: status == GroundingStatus::Grounded,
            citations_count: branch.citations.len(),
            latency_ms,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.analytics.record(&event) {
            tracing::warn!(session_id = %session_id, "Failed to record analytics: {}", e);
        }

        tracing::info!(
            session_id = %session_id,
            status = status.as_str(),
            citations = branch.citations.len(),
            latency_ms,
            "Answered question"
        );

        Ok(AskOutcome {
            answer,
            grounding_status: status,
            citations: branch.citations,
            session_id,
            finish_reason: branch.finish_reason,
            usage: branch.usage,
            trace: branch.trace.filter(|_| request.debug),
        })
    }

    async fn greet(&self, question: &str) -> BranchAnswer {
        let prompt = build_greeting_prompt(&self.profile, question);
        let request = GenerateRequest::greeting(&prompt.system_instruction, &prompt.user_text);

        match self.client.generate(&request).await {
            Ok(response) => {
                let text = response.text().trim().to_string();
                if text.is_empty() {
                    tracing::warn!("Greeting generation returned no text, using fallback");
                    return BranchAnswer::fixed(
                        replies::GREETING_FALLBACK,
                        GroundingStatus::NotApplicable,
                    );
                }
                BranchAnswer {
                    answer: text,
                    status: Some(GroundingStatus::NotApplicable),
                    finish_reason: Some(response.finish_reason().to_string()),
                    usage: Some(response.usage_metadata.clone()),
                    ..BranchAnswer::default()
                }
            }
            Err(e) => {
                tracing::warn!("Greeting generation failed, using fallback: {}", e);
                BranchAnswer::fixed(replies::GREETING_FALLBACK, GroundingStatus::NotApplicable)
            }
        }
    }

    async fn answer_from_materials(
        &self,
        session_id: &str,
        question: &str,
        request: &AskRequest,
        classification: &Classification,
        session: &SessionContext,
    ) -> AppResult<BranchAnswer> {
        let prepared = prepare_question(question, request.week.as_deref(), request.doc_type.as_deref());
        let rewritten = rewrite(question, &prepared.text, &session.user_turns);

        let prompt = build_answer_prompt(
            &self.profile,
            &rewritten.text,
            &rewritten.prompt_turns,
            session
                .last
                .as_ref()
                .filter(|_| rewritten.carried)
                .map(|l| l.question.as_str()),
        )?;

        let plan = RetrievalPlan::new(prepared.filter(), prepared.is_scoped(), &self.policy);
        let orchestrator = RetrievalOrchestrator::new(self.client.as_ref(), &self.policy);
        let result = orchestrator
            .run(
                &prompt,
                &plan,
                classification.signals.standalone_term.as_deref(),
            )
            .await?;

        let selected = result.selected;
        let parsed = selected.parsed;
        let finish_reason = Some(parsed.finish_reason.clone()).filter(|r| !r.is_empty());

        if !selected.decision.grounded || parsed.answer.trim().is_empty() {
            tracing::info!(
                reason = selected.decision.reason.as_str(),
                calls = result.trace.calls,
                "No grounded answer, asking for clarification"
            );
            return Ok(BranchAnswer {
                answer: replies::CLARIFICATION.to_string(),
                status: Some(GroundingStatus::NotFound),
                finish_reason,
                usage: Some(parsed.usage),
                trace: Some(result.trace),
                ..BranchAnswer::default()
            });
        }

        let last = LastGrounded {
            question: rewritten.text,
            answer: parsed.answer.clone(),
            references: parsed.references.clone(),
        };
        if let Err(e) = self.store.set_last_grounded(session_id, &last) {
            tracing::warn!(session_id, "Failed to store last grounded exchange: {}", e);
        }

        Ok(BranchAnswer {
            answer: parsed.answer,
            status: Some(selected.decision.status()),
            citations: parsed.references,
            finish_reason,
            usage: Some(parsed.usage),
            trace: Some(result.trace),
        })
    }
}

/// Sources are not shown; the last grounded references ride along as citations.
fn source_reply(last: Option<&LastGrounded>) -> BranchAnswer {
    let references = last.map(|l| l.references.clone()).unwrap_or_default();
    let status = if references.is_empty() {
        GroundingStatus::NotFound
    } else {
        GroundingStatus::Grounded
    };

    BranchAnswer {
        answer: replies::SOURCES_HIDDEN.to_string(),
        status: Some(status),
        citations: references,
        ..BranchAnswer::default()
    }
}

fn grounding_check_reply(last: Option<&LastGrounded>) -> BranchAnswer {
    match last {
        Some(last) if !last.references.is_empty() => {
            BranchAnswer::fixed(replies::GROUNDING_CONFIRMED, GroundingStatus::Grounded)
        }
        _ => BranchAnswer::fixed(replies::GROUNDING_MISSING, GroundingStatus::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_with_refs(count: usize) -> LastGrounded {
        LastGrounded {
            question: "q".to_string(),
            answer: "a".to_string(),
            references: (0..count)
                .map(|i| Reference::new(None, Some(format!("s{}.pdf", i)), None))
                .collect(),
        }
    }

    #[test]
    fn test_source_reply_uses_last_references() {
        let reply = source_reply(Some(&last_with_refs(2)));
        assert_eq!(reply.status, Some(GroundingStatus::Grounded));
        assert_eq!(reply.citations.len(), 2);
        assert_eq!(reply.answer, replies::SOURCES_HIDDEN);

        let empty = source_reply(None);
        assert_eq!(empty.status, Some(GroundingStatus::NotFound));
        assert!(empty.citations.is_empty());
    }

    #[test]
    fn test_grounding_check_reply() {
        assert_eq!(
            grounding_check_reply(Some(&last_with_refs(1))).answer,
            replies::GROUNDING_CONFIRMED
        );
        assert_eq!(
            grounding_check_reply(Some(&last_with_refs(0))).answer,
            replies::GROUNDING_MISSING
        );
        assert_eq!(
            grounding_check_reply(None).status,
            Some(GroundingStatus::NotFound)
        );
    }
}
