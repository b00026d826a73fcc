//! Approach-based question generation
//!
//! Source text is truncated, wrapped in a fixed instruction prompt and sent
//! to the completion service. The reply is read as a single JSON document
//! first; if that fails, every bracketed array-of-objects substring is tried
//! in turn. When nothing validates, a placeholder set is returned and flagged
//! so callers can warn the user.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::ai_client::{CompletionClient, CompletionError};
use crate::db::Question;
use crate::utils;

static CANDIDATE_RE: OnceLock<Regex> = OnceLock::new();

/// Non-greedy match of `[ { ... } ]`, spanning lines
fn candidate_regex() -> &'static Regex {
    CANDIDATE_RE.get_or_init(|| {
        Regex::new(r"(?s)\[\s*\{.*?\}\s*\]").expect("candidate pattern is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationConfig {
    pub max_source_chars: usize,
    pub question_count: usize,
    pub options_per_question: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_source_chars: 3000,
            question_count: 5,
            options_per_question: 4,
        }
    }
}

/// How a draft's questions were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftSource {
    /// Parsed and validated from the model output
    Parsed,
    /// Model output was unusable; generic questions were substituted
    Placeholder,
}

/// Generated questions carried from the generate step to the log step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizDraft {
    pub questions: Vec<Question>,
    pub source: DraftSource,
}

impl QuizDraft {
    pub fn is_placeholder(&self) -> bool {
        self.source == DraftSource::Placeholder
    }
}

/// `A`, `B`, ... for an option position
pub fn option_letter(index: usize) -> char {
    char::from(b'A' + (index % 26) as u8)
}

/// Build the instruction prompt for the given source text
pub fn build_prompt(text: &str, config: &GenerationConfig) -> String {
    let truncated = utils::truncate_chars(text, config.max_source_chars);
    let letters: Vec<String> = (0..config.options_per_question)
        .map(|i| option_letter(i).to_string())
        .collect();
    let example_options: Vec<String> = letters
        .iter()
        .map(|l| format!("\"Approach {}\"", l))
        .collect();

    format!(
        r#"You are an expert educational content creator. Create {count} approach-based questions based on the provided text. Each question should have:
- A clear, concise question stem
- {options} plausible approaches ({letters})
- NO correct or wrong answer (all approaches are valid)

Provide the output in the following EXACT JSON format, WITHOUT any additional text:
[
  {{
    "question": "How would you approach [problem/scenario]?",
    "options": [{example}]
  }}
]

Text to generate questions from:
{text}"#,
        count = config.question_count,
        options = config.options_per_question,
        letters = letters.join(", "),
        example = example_options.join(", "),
        text = truncated,
    )
}

/// Generic questions used when the model output cannot be used
pub fn placeholder_questions(config: &GenerationConfig) -> Vec<Question> {
    (1..=config.question_count)
        .map(|i| Question {
            question: format!("How would you approach problem {}?", i),
            options: (0..config.options_per_question)
                .map(|j| format!("Approach {}", option_letter(j)))
                .collect(),
        })
        .collect()
}

/// Check a JSON value against the expected shape and convert it
fn validate_questions(value: &Value, config: &GenerationConfig) -> Option<Vec<Question>> {
    let items = value.as_array()?;
    if items.len() != config.question_count {
        return None;
    }

    items
        .iter()
        .map(|item| {
            let question = item.get("question")?.as_str()?;
            let options = item.get("options")?.as_array()?;
            if options.len() != config.options_per_question {
                return None;
            }
            let options = options
                .iter()
                .map(|o| o.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()?;
            Some(Question::new(question, options))
        })
        .collect()
}

/// Strip a surrounding markdown code fence, if any
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // skip the language tag line
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Whole response as one JSON document: the array itself or `{"questions": [...]}`
fn parse_strict(raw: &str, config: &GenerationConfig) -> Option<Vec<Question>> {
    let value: Value = serde_json::from_str(strip_code_fence(raw)).ok()?;
    match &value {
        Value::Array(_) => validate_questions(&value, config),
        Value::Object(map) => validate_questions(map.get("questions")?, config),
        _ => None,
    }
}

/// First bracketed array-of-objects substring that parses and validates
fn parse_scan(raw: &str, config: &GenerationConfig) -> Option<Vec<Question>> {
    candidate_regex().find_iter(raw).find_map(|m| {
        let value: Value = serde_json::from_str(m.as_str()).ok()?;
        validate_questions(&value, config)
    })
}

/// Recover the question list from raw completion text
pub fn parse_questions(raw: &str, config: &GenerationConfig) -> Option<Vec<Question>> {
    if let Some(questions) = parse_strict(raw, config) {
        tracing::debug!("completion parsed as a single JSON document");
        return Some(questions);
    }
    let questions = parse_scan(raw, config)?;
    tracing::debug!("completion parsed from an embedded JSON array");
    Some(questions)
}

/// Generate a draft of approach-based questions from source text.
///
/// Transport and provider failures are returned as errors. An unusable reply
/// is not an error: the draft falls back to placeholders.
pub async fn generate_questions(
    client: &dyn CompletionClient,
    text: &str,
    config: &GenerationConfig,
) -> Result<QuizDraft, CompletionError> {
    let prompt = build_prompt(text, config);
    tracing::info!(
        backend = %client.backend(),
        model = client.model(),
        source_chars = text.chars().count().min(config.max_source_chars),
        "requesting questions"
    );

    let raw = client.complete(&prompt).await?;

    match parse_questions(&raw, config) {
        Some(questions) => Ok(QuizDraft {
            questions,
            source: DraftSource::Parsed,
        }),
        None => {
            tracing::warn!(
                expected = config.question_count,
                "automatic JSON parsing failed; using placeholder questions"
            );
            tracing::debug!(response = utils::truncate_chars(&raw, 500), "unparsed completion");
            Ok(QuizDraft {
                questions: placeholder_questions(config),
                source: DraftSource::Placeholder,
            })
        }
    }
}
