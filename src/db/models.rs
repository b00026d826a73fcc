use serde::{Deserialize, Serialize};

/// Columns a question's options are stored in, in order
pub const OPTION_COLUMNS: [&str; 4] = ["option_a", "option_b", "option_c", "option_d"];

/// An approach-based question: a stem plus options that are all valid
/// approaches (there is no correct answer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
}

impl Question {
    pub fn new(question: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            question: question.into(),
            options,
        }
    }
}

/// Summary row for listing logged quizzes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub created_at: i64,
    pub question_count: i64,
}

/// A logged quiz with its questions in insertion order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredQuiz {
    pub id: i64,
    pub title: String,
    pub created_at: i64,
    pub questions: Vec<Question>,
}
