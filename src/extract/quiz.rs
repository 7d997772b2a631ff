//! Tolerant quiz block parser
//!
//! Model output is frequently almost-JSON: wrapped in code fences, typeset
//! with curly quotes, carrying trailing commas or surrounded by prose. The
//! parser runs a fixed pipeline of normalization stages and then two parse
//! attempts. A result is only accepted when it carries a `questions` field.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```json|```").unwrap());
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static BRACED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// A multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Question text, may embed markup
    pub question: String,
    /// Answer options (four expected)
    pub options: Vec<String>,
    /// Zero-based index of the correct option
    pub answer_index: i64,
}

impl Question {
    /// Whether `answer_index` points at one of the options
    pub fn has_valid_answer(&self) -> bool {
        usize::try_from(self.answer_index).is_ok_and(|i| i < self.options.len())
    }
}

/// A generated quiz
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    /// Questions in presentation order
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Score a set of answers: +2 for a correct answer, -1 for a wrong one,
    /// 0 for an unanswered question
    pub fn score(&self, answers: &[Option<usize>]) -> i64 {
        self.questions
            .iter()
            .zip(answers.iter().chain(std::iter::repeat(&None)))
            .map(|(q, answer)| match answer {
                Some(a) if i64::try_from(*a).is_ok_and(|a| a == q.answer_index) => 2,
                Some(_) => -1,
                None => 0,
            })
            .sum()
    }
}

/// Remove ```` ```json ```` and ```` ``` ```` markers
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").into_owned()
}

/// Replace typographic quotes with their ASCII counterparts
pub fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

/// Drop commas that directly precede a closing brace or bracket
pub fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// First `{` through last `}`, if any
pub fn extract_braced(text: &str) -> Option<&str> {
    BRACED.find(text).map(|m| m.as_str())
}

/// Run all normalization stages in order
pub fn normalize(raw: &str) -> String {
    let text = raw.trim();
    let text = strip_code_fences(text);
    let text = normalize_quotes(&text);
    strip_trailing_commas(&text)
}

/// Question as it appears in model output, before validation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LooseQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    answer_index: Option<serde_json::Value>,
}

/// Integer answer index from `2`, `2.0` or `"2"`
fn coerce_index(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl LooseQuestion {
    fn into_question(self) -> Option<Question> {
        let answer_index = self.answer_index.as_ref().and_then(coerce_index)?;
        if self.question.trim().is_empty() {
            return None;
        }
        Some(Question { question: self.question, options: self.options, answer_index })
    }
}

/// Parse a JSON candidate, accepting it only when it has `questions`
///
/// Items without question text or a numeric answer index are dropped;
/// the rest of the quiz is kept.
fn parse_candidate(text: &str) -> Option<Quiz> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let items = value.get("questions")?;
    let Some(items) = items.as_array() else {
        tracing::debug!("Quiz payload has questions but they are not a list");
        return None;
    };

    let total = items.len();
    let questions: Vec<Question> = items
        .iter()
        .filter_map(|item| serde_json::from_value::<LooseQuestion>(item.clone()).ok())
        .filter_map(LooseQuestion::into_question)
        .collect();
    if questions.len() < total {
        tracing::debug!("Dropped {} unusable quiz questions", total - questions.len());
    }
    Some(Quiz { questions })
}

/// Parse a quiz block out of free-form model output
///
/// Returns `None` when nothing quiz-shaped can be recovered.
pub fn parse_quiz_block(raw: &str) -> Option<Quiz> {
    if raw.trim().is_empty() {
        return None;
    }

    let normalized = normalize(raw);
    if let Some(quiz) = parse_candidate(&normalized) {
        return Some(quiz);
    }

    let braced = extract_braced(&normalized)?;
    let cleaned = strip_trailing_commas(braced);
    let quiz = parse_candidate(&cleaned);
    if quiz.is_none() {
        tracing::debug!("Quiz block could not be parsed");
    }
    quiz
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str =
        r#"{"questions":[{"question":"Q","options":["a","b","c","d"],"answerIndex":1}]}"#;

    #[test]
    fn parses_valid_json() {
        let quiz = parse_quiz_block(VALID).unwrap();
        assert_eq!(quiz.questions.len(), 1);
        assert_eq!(quiz.questions[0].answer_index, 1);
        assert_eq!(quiz.questions[0].options, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn tolerates_trailing_commas_and_curly_quotes() {
        let messy = "{\u{201C}questions\u{201D}:[{\u{201C}question\u{201D}:\u{201C}Q\u{201D},\
                     \u{201C}options\u{201D}:[\u{201C}a\u{201D},\u{201C}b\u{201D},\u{201C}c\u{201D},\u{201C}d\u{201D},],\
                     \u{201C}answerIndex\u{201D}:1,},]}";
        let quiz = parse_quiz_block(messy).unwrap();
        assert_eq!(quiz.questions.len(), 1);
        assert_eq!(quiz.questions[0].answer_index, 1);
    }

    #[test]
    fn rejects_payload_without_questions() {
        assert!(parse_quiz_block(r#"{"foo": 1}"#).is_none());
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(parse_quiz_block("").is_none());
        assert!(parse_quiz_block("   ").is_none());
        assert!(parse_quiz_block("no json here").is_none());
    }

    #[test]
    fn strips_code_fences() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert!(parse_quiz_block(&fenced).is_some());
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let wrapped = format!("Here is your quiz:\n{}\nGood luck!", VALID);
        let quiz = parse_quiz_block(&wrapped).unwrap();
        assert_eq!(quiz.questions[0].question, "Q");
    }

    #[test]
    fn accepts_out_of_range_answer_index() {
        let raw = r#"{"questions":[{"question":"Q","options":["a","b","c","d"],"answerIndex":7}]}"#;
        let quiz = parse_quiz_block(raw).unwrap();
        assert_eq!(quiz.questions[0].answer_index, 7);
        assert!(!quiz.questions[0].has_valid_answer());
    }

    #[test]
    fn unusable_questions_are_dropped() {
        let raw = r#"{"questions":[
            {"question":"kept","options":["a","b","c","d"],"answerIndex":2.0},
            {"question":"no answer","options":["a","b","c","d"]},
            {"question":"","options":["a","b","c","d"],"answerIndex":0},
            {"question":"text index","options":["a","b","c","d"],"answerIndex":"3"},
            "not an object"
        ]}"#;
        let quiz = parse_quiz_block(raw).unwrap();
        let kept: Vec<(&str, i64)> =
            quiz.questions.iter().map(|q| (q.question.as_str(), q.answer_index)).collect();
        assert_eq!(kept, vec![("kept", 2), ("text index", 3)]);
    }

    #[test]
    fn missing_options_default_to_empty() {
        let quiz = parse_quiz_block(r#"{"questions":[{"question":"Q","answerIndex":1}]}"#).unwrap();
        assert!(quiz.questions[0].options.is_empty());
        assert!(!quiz.questions[0].has_valid_answer());
    }

    #[test]
    fn stage_normalize_quotes() {
        assert_eq!(normalize_quotes("\u{2018}a\u{2019} \u{201C}b\u{201D}"), "'a' \"b\"");
    }

    #[test]
    fn stage_strip_trailing_commas() {
        assert_eq!(strip_trailing_commas("[1, 2, ]"), "[1, 2 ]");
        assert_eq!(strip_trailing_commas("{\"a\":1,\n}"), "{\"a\":1\n}");
        assert_eq!(strip_trailing_commas("\"a,b\""), "\"a,b\"");
    }

    #[test]
    fn stage_extract_braced_is_greedy() {
        assert_eq!(extract_braced("x {a} y {b} z"), Some("{a} y {b}"));
        assert_eq!(extract_braced("none"), None);
    }

    #[test]
    fn score_rewards_and_penalizes() {
        let quiz = parse_quiz_block(
            r#"{"questions":[
                {"question":"1","options":["a","b","c","d"],"answerIndex":0},
                {"question":"2","options":["a","b","c","d"],"answerIndex":3},
                {"question":"3","options":["a","b","c","d"],"answerIndex":2}
            ]}"#,
        )
        .unwrap();
        assert_eq!(quiz.score(&[Some(0), Some(1)]), 1);
        assert_eq!(quiz.score(&[Some(0), Some(3), Some(2)]), 6);
        assert_eq!(quiz.score(&[]), 0);
    }
}
