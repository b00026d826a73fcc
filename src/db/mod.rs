mod schema;
mod models;

pub use schema::{Database, DbError, SqliteDetail};
pub use models::{Question, QuizSummary, StoredQuiz, OPTION_COLUMNS};
