//! Question classification.
//!
//! Bilingual (Hebrew/English) pattern tables that map a question to an
//! [`Intent`] and extract side signals: explicit week, syllabus intent and
//! the term of a definition question. The tables sit behind
//! [`QuestionClassifier`] so the orchestration never depends on them directly.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(hi|hello|hey|shalom|שלום|היי|הי|מה\s+שלומך|מה\s+נשמע|בוקר\s+טוב|ערב\s+טוב)\s*[.!?]*$",
    )
    .expect("valid greeting regex")
});

static WEATHER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(weather|forecast|temperature|rain|humidity|מזג\s*האוויר|תחזית|טמפרטור|גשם|לחות)")
        .expect("valid weather regex")
});

static COURSE_VOCABULARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(אתיקה|מוסר|קאנט|רולס|תועלתנות|דהונטולוג|משאבי\s*אנוש|\bhr\b|קורס)")
        .expect("valid course vocabulary regex")
});

static SOURCE_REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(מקורות|מקור|ציטוט|ציטוטים|sources|references)")
        .expect("valid source request regex")
});

static GROUNDING_TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(מבוסס|מבוססת|grounded|based\s+on)").expect("valid grounding term regex")
});

static INTERROGATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(האם|\bis\b|\bare\b)").expect("valid interrogative regex"));

static SYLLABUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(סילבוס|syllabus|מבנה הקורס|נושאי הקורס|דרישות הקורס|מטלות|ציון|הערכה|grading|requirements)",
    )
    .expect("valid syllabus regex")
});

/// Week or lecture marker followed by a number. English markers must not
/// follow a letter, so "show 3" and "midweek 2" carry no week. An underscore
/// may precede them, as in "Ethics_Week02".
static WEEK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:(?:^|[^\p{L}])(?:week|wk|lecture|w)|שבוע|הרצאה)[\s_\-]*0*(\d{1,2})")
        .expect("valid week regex")
});

static HEBREW_DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:מה|מי|איזה|איזו)\s+(?:זה|זו|זאת|הוא|היא)(?:\s|$|[,.!?])")
        .expect("valid hebrew definition regex")
});

static ENGLISH_DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:what|who)\s+(?:is|are)\b").expect("valid english definition regex")
});

static HEBREW_TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:מה|מי|איזה|איזו)\s+(?:זה|זו|זאת|הוא|היא)\s+(.+?)\s*[?.!]*$")
        .expect("valid hebrew term regex")
});

static ENGLISH_TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:what|who)\s+(?:is|are)\s+(.+?)\s*[?.!]*$").expect("valid english term regex")
});

/// Metadata filter for syllabus questions.
pub const SYLLABUS_FILTER: &str = r#"type="syllabus""#;

/// Question intent. Variants are listed in matching priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    OffTopicWeather,
    SourceRequest,
    GroundingCheck,
    Generic,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::OffTopicWeather => "off_topic_weather",
            Self::SourceRequest => "source_request",
            Self::GroundingCheck => "grounding_check",
            Self::Generic => "generic",
        }
    }
}

/// Signals extracted independently of the intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSignals {
    /// Explicit week, zero-padded to two digits
    pub week: Option<String>,

    /// Syllabus, requirements or grading vocabulary present
    pub syllabus: bool,

    /// Term of a definition question ("what is X")
    pub standalone_term: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub signals: QuestionSignals,
}

/// Maps a question to an intent plus signals.
pub trait QuestionClassifier: Send + Sync {
    fn classify(&self, question: &str) -> Classification;
}

/// Regex-table classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl QuestionClassifier for PatternClassifier {
    fn classify(&self, question: &str) -> Classification {
        classify(question)
    }
}

/// Classify a question with the built-in pattern tables.
pub fn classify(question: &str) -> Classification {
    let question = question.trim();
    Classification {
        intent: detect_intent(question),
        signals: QuestionSignals {
            week: detect_week(question),
            syllabus: is_syllabus_query(question),
            standalone_term: extract_standalone_term(question),
        },
    }
}

/// First matching intent wins.
pub fn detect_intent(question: &str) -> Intent {
    let question = question.trim();

    if !question.is_empty() && GREETING_RE.is_match(question) {
        Intent::Greeting
    } else if WEATHER_RE.is_match(question) && !COURSE_VOCABULARY_RE.is_match(question) {
        Intent::OffTopicWeather
    } else if SOURCE_REQUEST_RE.is_match(question) {
        Intent::SourceRequest
    } else if GROUNDING_TERM_RE.is_match(question) && INTERROGATIVE_RE.is_match(question) {
        Intent::GroundingCheck
    } else {
        Intent::Generic
    }
}

/// Explicit week number, zero-padded to two digits.
pub fn detect_week(question: &str) -> Option<String> {
    WEEK_RE
        .captures(question)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|n| format!("{:02}", n))
}

pub fn is_syllabus_query(question: &str) -> bool {
    SYLLABUS_RE.is_match(question)
}

/// Whether the question opens with a definition template.
pub fn is_standalone_definition(question: &str) -> bool {
    let question = question.trim();
    !question.is_empty()
        && (HEBREW_DEFINITION_RE.is_match(question) || ENGLISH_DEFINITION_RE.is_match(question))
}

/// Captured term of a definition question, trimmed and unquoted.
pub fn extract_standalone_term(question: &str) -> Option<String> {
    let question = question.trim();
    let caps = HEBREW_TERM_RE
        .captures(question)
        .or_else(|| ENGLISH_TERM_RE.captures(question))?;

    let term = caps
        .get(1)?
        .as_str()
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim();

    term.chars()
        .any(char::is_alphanumeric)
        .then(|| term.to_string())
}

/// Question text after the caller's hints are folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuestion {
    pub text: String,
    pub week: Option<String>,
    pub syllabus: bool,
}

impl PreparedQuestion {
    /// Metadata filter for the filtered attempt.
    pub fn filter(&self) -> Option<String> {
        if self.syllabus {
            Some(SYLLABUS_FILTER.to_string())
        } else {
            self.week.as_ref().map(|w| format!(r#"week="{}""#, w))
        }
    }

    /// The question asked for a syllabus or week scope.
    pub fn is_scoped(&self) -> bool {
        self.syllabus || self.week.is_some()
    }
}

/// Fold document-type and week hints into the question, then detect week
/// and syllabus scope on the result.
pub fn prepare_question(
    question: &str,
    week_hint: Option<&str>,
    doc_type_hint: Option<&str>,
) -> PreparedQuestion {
    let mut text = question.trim().to_string();

    if let Some(doc_type) = doc_type_hint.map(str::trim).filter(|s| !s.is_empty()) {
        text = format!("בהקשר של {}, {}", doc_type, text);
    }
    if let Some(week) = week_hint.map(str::trim).filter(|s| !s.is_empty()) {
        text = format!("בהקשר לשבוע {}, {}", week, text);
    }

    let week = detect_week(&text);
    let syllabus = is_syllabus_query(&text);
    if syllabus {
        text = format!("סילבוס הקורס: {}", text);
    }

    PreparedQuestion {
        text,
        week,
        syllabus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greetings() {
        for q in ["hello", "Hi!", "שלום", "מה  נשמע?", "בוקר טוב."] {
            assert_eq!(detect_intent(q), Intent::Greeting, "{}", q);
        }
        assert_eq!(detect_intent("hello, what is Kant's ethics?"), Intent::Generic);
    }

    #[test]
    fn test_weather_unless_course_vocabulary() {
        assert_eq!(detect_intent("מה מזג האוויר מחר?"), Intent::OffTopicWeather);
        assert_eq!(detect_intent("what's the forecast"), Intent::OffTopicWeather);
        assert_eq!(
            detect_intent("איך קאנט היה מתייחס לשקר על מזג האוויר?"),
            Intent::Generic
        );
        assert_eq!(
            detect_intent("is it ethical for HR to cancel work because of rain?"),
            Intent::Generic
        );
    }

    #[test]
    fn test_source_request_before_grounding_check() {
        assert_eq!(detect_intent("תן לי מקורות"), Intent::SourceRequest);
        assert_eq!(detect_intent("show references"), Intent::SourceRequest);
        assert_eq!(detect_intent("האם התשובה מבוססת?"), Intent::GroundingCheck);
        assert_eq!(
            detect_intent("Is this answer based on the slides?"),
            Intent::GroundingCheck
        );
        assert_eq!(detect_intent("התשובה מבוססת"), Intent::Generic);
    }

    #[test]
    fn test_week_detection() {
        assert_eq!(detect_week("מה למדנו בשבוע 3?"), Some("03".to_string()));
        assert_eq!(detect_week("week 12 summary"), Some("12".to_string()));
        assert_eq!(detect_week("Week02_Lecture.pdf"), Some("02".to_string()));
        assert_eq!(detect_week("הרצאה 5"), Some("05".to_string()));
        assert_eq!(detect_week("w4 slides"), Some("04".to_string()));
        assert_eq!(detect_week("show 3 examples"), None);
        assert_eq!(detect_week("midweek 2 recap"), None);
        assert_eq!(detect_week("the lecture 7 reading"), Some("07".to_string()));
        assert_eq!(detect_week("Ethics_Week02.pdf"), Some("02".to_string()));
        assert_eq!(detect_week("מהי תועלתנות?"), None);
    }

    #[test]
    fn test_standalone_term() {
        assert_eq!(
            extract_standalone_term("what is utilitarianism?"),
            Some("utilitarianism".to_string())
        );
        assert_eq!(
            extract_standalone_term("מה זה \"צעיף הבערות\"?"),
            Some("צעיף הבערות".to_string())
        );
        assert_eq!(
            extract_standalone_term("Who are the stakeholders"),
            Some("the stakeholders".to_string())
        );
        assert_eq!(extract_standalone_term("explain utilitarianism"), None);
        assert_eq!(extract_standalone_term("what is ?"), None);
    }

    #[test]
    fn test_standalone_definition_template() {
        assert!(is_standalone_definition("מה זה אימפרטיב קטגורי?"));
        assert!(is_standalone_definition("מה זה?"));
        assert!(is_standalone_definition("What is this"));
        assert!(!is_standalone_definition("מהזה"));
        assert!(!is_standalone_definition("whatever is fine"));
    }

    #[test]
    fn test_classify_collects_signals() {
        let classification = PatternClassifier.classify("  what is the grading in week 2?  ");
        assert_eq!(classification.intent, Intent::Generic);
        assert_eq!(classification.signals.week.as_deref(), Some("02"));
        assert!(classification.signals.syllabus);
        assert_eq!(
            classification.signals.standalone_term.as_deref(),
            Some("the grading in week 2")
        );
    }

    #[test]
    fn test_prepare_question_with_hints() {
        let prepared = prepare_question("מה העיקרון המרכזי?", Some("3"), Some("מצגת"));
        assert_eq!(
            prepared.text,
            "בהקשר לשבוע 3, בהקשר של מצגת, מה העיקרון המרכזי?"
        );
        assert_eq!(prepared.week.as_deref(), Some("03"));
        assert!(!prepared.syllabus);
        assert_eq!(prepared.filter().as_deref(), Some(r#"week="03""#));
        assert!(prepared.is_scoped());
    }

    #[test]
    fn test_prepare_syllabus_question() {
        let prepared = prepare_question("מה דרישות הקורס בשבוע 4?", None, None);
        assert!(prepared.text.starts_with("סילבוס הקורס: "));
        assert_eq!(prepared.filter().as_deref(), Some(SYLLABUS_FILTER));
    }

    #[test]
    fn test_prepare_plain_question_has_no_filter() {
        let prepared = prepare_question("מהי תועלתנות?", None, Some("  "));
        assert_eq!(prepared.text, "מהי תועלתנות?");
        assert_eq!(prepared.filter(), None);
        assert!(!prepared.is_scoped());
    }
}
