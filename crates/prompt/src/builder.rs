//! Prompt builder for the answer and greeting variants.

use crate::types::{PromptPayload, PromptProfile, PromptVariant, TranscriptLabels};
use handlebars::Handlebars;
use std::collections::HashMap;
use tutor_core::{AppError, AppResult, ConversationTurn, Role};

/// Build the answer prompt.
///
/// The instruction joins every answer section of the profile with newlines in
/// a fixed order. The user text is the profile's template rendered with:
/// * `lastGrounded` - question of the last grounded answer, if any
/// * `history` - one `label: text` line per recent turn
/// * `question` - the (possibly rewritten) question
///
/// # Example
/// ```
/// use tutor_prompt::{build_answer_prompt, PromptProfile};
///
/// let payload = build_answer_prompt(&PromptProfile::default(), "מהי תועלתנות?", &[], None).unwrap();
/// assert!(payload.user_text.ends_with("שאלה: מהי תועלתנות?"));
/// ```
pub fn build_answer_prompt(
    profile: &PromptProfile,
    question: &str,
    recent_turns: &[ConversationTurn],
    last_grounded_question: Option<&str>,
) -> AppResult<PromptPayload> {
    tracing::debug!(
        profile = %profile.id,
        turns = recent_turns.len(),
        has_last_grounded = last_grounded_question.is_some(),
        "Building answer prompt"
    );

    let mut variables = HashMap::new();
    variables.insert(
        "lastGrounded".to_string(),
        last_grounded_question
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
    );
    variables.insert(
        "history".to_string(),
        format_history(recent_turns, &profile.labels),
    );
    variables.insert("question".to_string(), question.trim().to_string());

    let user_text = render_template(&profile.user_template, &variables)?;

    Ok(PromptPayload {
        variant: PromptVariant::Answer,
        system_instruction: join_sections(&profile.answer_sections()),
        user_text,
    })
}

/// Build the greeting prompt. A blank question is replaced by the profile's
/// default greeting text.
pub fn build_greeting_prompt(profile: &PromptProfile, question: &str) -> PromptPayload {
    let question = question.trim();
    let user_text = if question.is_empty() {
        profile.greeting.default_user_text.clone()
    } else {
        question.to_string()
    };

    PromptPayload {
        variant: PromptVariant::Greeting,
        system_instruction: join_sections(&profile.greeting_sections()),
        user_text,
    }
}

/// Format turns as a plain transcript, oldest first.
pub fn format_history(turns: &[ConversationTurn], labels: &TranscriptLabels) -> String {
    turns
        .iter()
        .filter(|turn| !turn.text.trim().is_empty())
        .map(|turn| {
            let label = match turn.role {
                Role::User => &labels.student,
                Role::Assistant => &labels.assistant,
            };
            format!("{}: {}", label, turn.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_sections(sections: &[&str]) -> String {
    sections
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a Handlebars template with variables.
pub(crate) fn render_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
