//! Prompt types for the course tutor.
//!
//! A [`PromptProfile`] holds every instruction section. The built-in profile
//! targets the Hebrew "Introduction to Ethics" course; a YAML file can
//! replace any subset of the sections.

use serde::{Deserialize, Serialize};

/// Exact reply the model must give when the retrieved material has nothing relevant.
pub const NOT_FOUND_SENTINEL: &str = "NOT_FOUND";

/// Instruction sections and transcript labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PromptProfile {
    /// Unique profile identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    pub api_version: String,

    pub persona: String,
    pub goals: String,
    pub grounding: String,
    pub not_found: String,
    pub materials: String,
    pub syllabus: String,
    pub practice: String,
    pub interaction: String,
    pub language: String,
    pub redirect: String,
    pub clarify: String,

    /// Output-format contract appended to every system instruction
    pub output: String,

    /// Greeting-only rules
    pub greeting: GreetingRules,

    /// Transcript labels
    pub labels: TranscriptLabels,

    /// Handlebars template of the user text block.
    ///
    /// Variables: `lastGrounded`, `history`, `question`.
    pub user_template: String,
}

/// Rules used only by the greeting variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GreetingRules {
    pub style: String,
    pub suggestions: String,

    /// User text sent when the greeting question is blank
    pub default_user_text: String,
}

/// Speaker labels used in the history transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranscriptLabels {
    pub student: String,
    pub assistant: String,
}

impl Default for GreetingRules {
    fn default() -> Self {
        Self {
            style: "ענה/י בברכה ידידותית ונלהבת, בניסוח טבעי ולא רובוטי, עם משפט פתיחה אישי."
                .to_string(),
            suggestions: "הצע/י 3-4 שאלות מובנות על חומרי הקורס כדי להתחיל את הלמידה."
                .to_string(),
            default_user_text: "שלום".to_string(),
        }
    }
}

impl Default for TranscriptLabels {
    fn default() -> Self {
        Self {
            student: "סטודנט".to_string(),
            assistant: "עוזר".to_string(),
        }
    }
}

const DEFAULT_USER_TEMPLATE: &str = "{{#if lastGrounded}}שאלה אחרונה עם מקור: {{lastGrounded}}{{/if}}\n\nשיחות אחרונות:\n{{history}}\n\nשאלה: {{question}}";

impl Default for PromptProfile {
    fn default() -> Self {
        Self {
            id: "tutor.ethics.default".to_string(),
            title: "Ethics course teaching assistant".to_string(),
            api_version: "1.0".to_string(),
            persona: "את/ה עוזר/ת הוראה וכמרצה בקורס 'מבוא לאתיקה למשא' במכללה האקדמית כנרת, \
                      עבור סטודנטים לתואר ראשון בניהול משאבי אנוש."
                .to_string(),
            goals: "סייע/י לסטודנטים להבין גישות שונות לאתיקה ומוסר, את החומר הנלמד, \
                    ואת הקשר בין הנושאים השונים בקורס. המטרה היא למידה עמוקה והבנה, \
                    עם ניסוח חם ומעודד."
                .to_string(),
            grounding: "הסתמך/י באופן בלעדי על חומרי הידע שסופקו בכלי File Search, \
                        בדגש על מצגות הקורס והסילבוס. אל תוסיף/י ידע חיצוני."
                .to_string(),
            not_found: format!(
                "החזר/י בדיוק {} רק אם כלי File Search לא מחזיר מידע רלוונטי לשאלה. \
                 אם יש התאמה חלקית (גם אם קצרה), תן/י תשובה קצרה שמבוססת רק על מה שנמצא, \
                 וציין/י שהמידע בחומר המצורף חלקי והצע/י כיצד לחדד את השאלה.",
                NOT_FOUND_SENTINEL
            ),
            materials: "השתמש/י בסילבוס כמפת דרכים לקישור בין נושאי הלימוד לחומרי הקריאה, \
                        ותן/י עדיפות עליונה לתוכן במצגות. ציין/י כיצד ההסבר מתקשר לחומר הכיתתי."
                .to_string(),
            syllabus: "אם השאלה מתייחסת לסילבוס, דרישות קורס, ציונים או מבנה הקורס, \
                       חפש/י תחילה בסילבוס וסכם/י ממנו באופן ברור ומובנה."
                .to_string(),
            practice: "Offer a practice question only if the student explicitly asks for a quiz, \
                       practice, or an exercise."
                .to_string(),
            interaction: "הסבר/י מושגים מורכבים בצורה פשוטה ונגישה לסטודנטים בניהול משאבי אנוש. \
                          השתמש/י בדוגמאות עסקיות רלוונטיות רק אם הן מופיעות בחומרי הקורס. \
                          בסוף כל תשובה, שאל/י אם ההסבר ברור ואם יש שאלות נוספות."
                .to_string(),
            language: "ברירת המחדל היא עברית תקנית וברורה. אם הסטודנט מבקש שפה אחרת, \
                       ענה/י בה אך שלב/י מונחים מקצועיים בעברית."
                .to_string(),
            redirect: "אם נשאלת שאלה שאינה קשורה לקורס, הפנה/י בעדינות לנושאי הקורס \
                       והצע/י דוגמה לשאלה מתאימה."
                .to_string(),
            clarify: "אם המונח המבוקש לא נמצא בדיוק בחומר, בקש/י הבהרה לאיזה מושג והקשר הוא מתכוון."
                .to_string(),
            output: "Answer only from the supplied course material. \
                     Answer in clear, natural Hebrew. Keep responses concise: about 4-8 short \
                     sentences or 3-5 bullets. Avoid long introductions, repeated points, and \
                     extra sections. Do not add a practice question unless explicitly requested. \
                     End with one short follow-up question. \
                     Do not include citation markers like [cite: 1, 2]."
                .to_string(),
            greeting: GreetingRules::default(),
            labels: TranscriptLabels::default(),
            user_template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }
}

impl PromptProfile {
    /// Sections of the answer instruction, in their fixed order.
    pub fn answer_sections(&self) -> [&str; 12] {
        [
            &self.persona,
            &self.goals,
            &self.grounding,
            &self.not_found,
            &self.materials,
            &self.syllabus,
            &self.practice,
            &self.interaction,
            &self.language,
            &self.redirect,
            &self.clarify,
            &self.output,
        ]
    }

    /// Sections of the greeting instruction, in their fixed order.
    pub fn greeting_sections(&self) -> [&str; 7] {
        [
            &self.persona,
            &self.goals,
            &self.grounding,
            &self.greeting.style,
            &self.greeting.suggestions,
            &self.language,
            &self.output,
        ]
    }
}

/// Which instruction set a payload was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    Answer,
    Greeting,
}

/// Instruction and user text for one generation call. Built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPayload {
    pub variant: PromptVariant,
    pub system_instruction: String,
    pub user_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_embeds_sentinel() {
        let profile = PromptProfile::default();
        assert!(profile.not_found.contains(NOT_FOUND_SENTINEL));
        assert!(profile.output.contains("citation markers"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "id: custom\npersona: \"You are a logic tutor.\"\nlabels:\n  student: Student\n";
        let profile: PromptProfile = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(profile.id, "custom");
        assert_eq!(profile.persona, "You are a logic tutor.");
        assert_eq!(profile.labels.student, "Student");
        assert_eq!(profile.labels.assistant, "עוזר");
        assert_eq!(profile.output, PromptProfile::default().output);
    }
}
