//! Follow-up detection and question rewriting.

use crate::classifier::is_standalone_definition;
use regex::Regex;
use std::sync::LazyLock;
use tutor_core::ConversationTurn;

static FOLLOW_UP_OPENER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:ו?איך|ו?למה|תסביר|תרחיב|אפשר\s+להרחיב|what about|and what about|can you elaborate|why)\b",
    )
    .expect("valid follow-up opener regex")
});

const DEICTIC_TOKENS: &[&str] = &["זה", "זאת", "הזה", "הזאת", "this", "that", "those"];

/// Questions longer than this are assumed to stand on their own.
pub const SHORT_QUESTION_MAX_TOKENS: usize = 12;

/// Turns read from the store per question.
pub const RECENT_TURNS_WINDOW: usize = 12;

/// User turns carried into the prompt when context is carried.
pub const PROMPT_USER_TURNS: usize = 6;

/// Whether the previous user turn should be folded into the question.
pub fn should_carry_context(question: &str, last_user_text: &str) -> bool {
    let question = question.trim();
    if question.is_empty() || last_user_text.trim().is_empty() {
        return false;
    }

    if is_standalone_definition(question) {
        return false;
    }

    if FOLLOW_UP_OPENER_RE.is_match(question) {
        return true;
    }

    has_deictic_reference(question) && token_count(question) <= SHORT_QUESTION_MAX_TOKENS
}

fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn has_deictic_reference(text: &str) -> bool {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| token.trim_end_matches(['.', '!', '?']).to_lowercase())
        .any(|token| DEICTIC_TOKENS.contains(&token.as_str()))
}

/// The last `limit` user turns, oldest first.
pub fn user_turns_for_prompt(turns: &[ConversationTurn], limit: usize) -> Vec<ConversationTurn> {
    if limit == 0 {
        return Vec::new();
    }
    let user_turns: Vec<_> = turns.iter().filter(|t| t.is_user()).cloned().collect();
    let skip = user_turns.len().saturating_sub(limit);
    user_turns.into_iter().skip(skip).collect()
}

/// Question text and prompt window after the follow-up decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenQuestion {
    pub carried: bool,

    /// Text sent downstream
    pub text: String,

    /// Empty unless context was carried
    pub prompt_turns: Vec<ConversationTurn>,
}

/// Decide on context carry for `question` and rewrite `prepared` accordingly.
///
/// `question` is the raw user text the heuristics run on; `prepared` is the
/// same question after caller hints were folded in.
pub fn rewrite(question: &str, prepared: &str, user_turns: &[ConversationTurn]) -> RewrittenQuestion {
    let last_user_text = user_turns.last().map(|t| t.text.trim()).unwrap_or("");

    if !should_carry_context(question, last_user_text) {
        return RewrittenQuestion {
            carried: false,
            text: prepared.to_string(),
            prompt_turns: Vec::new(),
        };
    }

    tracing::debug!(last_user_text, "Carrying follow-up context");

    RewrittenQuestion {
        carried: true,
        text: format!("בהקשר לשאלה הקודמת \"{}\": {}", last_user_text, prepared),
        prompt_turns: user_turns.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::Role;

    #[test]
    fn test_definition_question_never_carries() {
        for last in ["מה זה קאנט?", "explain the veil of ignorance", "ולמה?"] {
            assert!(!should_carry_context("what is utilitarianism?", last));
            assert!(!should_carry_context("מה זה אימפרטיב קטגורי?", last));
        }
    }

    #[test]
    fn test_follow_up_openers() {
        assert!(should_carry_context("ולמה זה חשוב לארגון ולעובדים בו בטווח הארוך לדעתך ובכלל?", "מה זה קאנט?"));
        assert!(should_carry_context("איך זה קשור?", "x"));
        assert!(should_carry_context("What about Rawls?", "x"));
        assert!(should_carry_context("can you elaborate", "x"));
        assert!(!should_carry_context("whyever not", "x"));
    }

    #[test]
    fn test_short_deictic_question() {
        let last = "מהי תועלתנות?";
        assert!(should_carry_context("ומה עם זה?", last));
        assert!(should_carry_context("give an example of that.", last));

        let padded = "give an example of that from the lecture slides about ethics in the modern workplace please";
        assert!(padded.split_whitespace().count() > SHORT_QUESTION_MAX_TOKENS);
        assert!(!should_carry_context(padded, last));
    }

    #[test]
    fn test_no_carry_without_prior_turn() {
        assert!(!should_carry_context("ולמה?", ""));
        assert!(!should_carry_context("   ", "prior"));
        assert!(!should_carry_context("thistle farming ethics", "prior"));
    }

    #[test]
    fn test_user_turns_for_prompt_keeps_last_user_turns() {
        let mut turns = Vec::new();
        for i in 0..8 {
            turns.push(ConversationTurn::new(Role::User, format!("q{}", i)));
            turns.push(ConversationTurn::new(Role::Assistant, format!("a{}", i)));
        }

        let picked = user_turns_for_prompt(&turns, 6);
        let texts: Vec<_> = picked.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["q2", "q3", "q4", "q5", "q6", "q7"]);
        assert!(user_turns_for_prompt(&turns, 0).is_empty());
    }

    #[test]
    fn test_rewrite_prefixes_last_question() {
        let turns = vec![ConversationTurn::new(Role::User, "מהי תועלתנות?")];

        let carried = rewrite("ולמה?", "ולמה?", &turns);
        assert!(carried.carried);
        assert_eq!(carried.text, "בהקשר לשאלה הקודמת \"מהי תועלתנות?\": ולמה?");
        assert_eq!(carried.prompt_turns.len(), 1);

        let fresh = rewrite("מהי דאונטולוגיה?", "מהי דאונטולוגיה?", &turns);
        assert!(!fresh.carried);
        assert_eq!(fresh.text, "מהי דאונטולוגיה?");
        assert!(fresh.prompt_turns.is_empty());
    }
}
