use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use super::models::{Question, QuizSummary, StoredQuiz, OPTION_COLUMNS};
use crate::utils;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("quiz title is empty")]
    EmptyTitle,
    #[error("quiz has no questions")]
    NoQuestions,
    #[error("question {} has {found} options, expected {}", .index + 1, OPTION_COLUMNS.len())]
    InvalidOptions { index: usize, found: usize },
    #[error("failed to create database directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database connection lock poisoned")]
    LockPoisoned,
}

/// Code and message of a failure reported by SQLite itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteDetail {
    pub code: String,
    pub message: String,
}

impl DbError {
    /// Database-layer detail for error reporting; None for validation errors
    pub fn sqlite_detail(&self) -> Option<SqliteDetail> {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, msg)) => Some(SqliteDetail {
                code: format!("{:?} ({})", err.code, err.extended_code),
                message: msg.clone().unwrap_or_else(|| err.to_string()),
            }),
            DbError::Sqlite(other) => Some(SqliteDetail {
                code: "n/a".to_string(),
                message: other.to_string(),
            }),
            _ => None,
        }
    }

    /// Whether the caller sent something unloggable (as opposed to a storage failure)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DbError::EmptyTitle | DbError::NoQuestions | DbError::InvalidOptions { .. }
        )
    }
}

pub struct Database {
    conn: Mutex<Connection>,
    path: String,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| DbError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(&path)?;
        let db = Database { conn: Mutex::new(conn), path: path_str };
        db.init()?;
        Ok(db)
    }

    pub fn get_path(&self) -> String {
        self.path.clone()
    }

    pub fn in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn: Mutex::new(conn), path: ":memory:".to_string() };
        db.init()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS quizzes (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY,
                quiz_id INTEGER NOT NULL REFERENCES quizzes(id) ON DELETE CASCADE,
                question TEXT NOT NULL,
                option_a TEXT NOT NULL,
                option_b TEXT NOT NULL,
                option_c TEXT NOT NULL,
                option_d TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_questions_quiz_id ON questions(quiz_id);
            "
        )?;

        // Migration: tables created by older tooling lack created_at
        let has_created_at: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('quizzes') WHERE name = 'created_at'",
            [],
            |row| row.get(0),
        )?;

        if !has_created_at {
            conn.execute("ALTER TABLE quizzes ADD COLUMN created_at INTEGER NOT NULL DEFAULT 0", [])?;
        }

        Ok(())
    }

    /// Persist a quiz and all its questions in one transaction.
    ///
    /// Input is validated before anything is written. If any insert fails the
    /// transaction is rolled back, so the quiz row never exists without its
    /// questions. Returns the new quiz id.
    pub fn log_quiz(&self, title: &str, questions: &[Question]) -> Result<i64, DbError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DbError::EmptyTitle);
        }
        if questions.is_empty() {
            return Err(DbError::NoQuestions);
        }
        if let Some((index, q)) = questions
            .iter()
            .enumerate()
            .find(|(_, q)| q.options.len() != OPTION_COLUMNS.len())
        {
            return Err(DbError::InvalidOptions { index, found: q.options.len() });
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO quizzes (title, created_at) VALUES (?1, ?2)",
            params![title, utils::now_millis()],
        )?;
        let quiz_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO questions (quiz_id, question, option_a, option_b, option_c, option_d)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for q in questions {
                stmt.execute(params![
                    quiz_id,
                    q.question,
                    q.options[0],
                    q.options[1],
                    q.options[2],
                    q.options[3],
                ])?;
            }
        }

        // Dropping `tx` on any early return above rolls back
        tx.commit()?;

        tracing::info!(quiz_id, questions = questions.len(), "quiz logged");
        Ok(quiz_id)
    }

    /// All logged quizzes, newest first
    pub fn list_quizzes(&self) -> Result<Vec<QuizSummary>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT q.id, q.title, q.created_at, COUNT(qs.id)
             FROM quizzes q
             LEFT JOIN questions qs ON qs.quiz_id = q.id
             GROUP BY q.id
             ORDER BY q.created_at DESC, q.id DESC",
        )?;
        let quizzes = stmt
            .query_map([], |row| {
                Ok(QuizSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                    question_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(quizzes)
    }

    pub fn get_quiz(&self, id: i64) -> Result<Option<StoredQuiz>, DbError> {
        let conn = self.conn()?;

        let header = conn
            .query_row(
                "SELECT id, title, created_at FROM quizzes WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()?;

        let Some((id, title, created_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT question, option_a, option_b, option_c, option_d
             FROM questions WHERE quiz_id = ?1 ORDER BY id",
        )?;
        let questions = stmt
            .query_map(params![id], |row| {
                Ok(Question {
                    question: row.get(0)?,
                    options: vec![row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?],
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(StoredQuiz { id, title, created_at, questions }))
    }

    pub fn quiz_count(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM quizzes", [], |row| row.get(0))?)
    }

    pub fn question_count(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_options(prefix: &str) -> Vec<String> {
        ["A", "B", "C", "D"]
            .iter()
            .map(|l| format!("{} approach {}", prefix, l))
            .collect()
    }

    fn sample_questions(n: usize) -> Vec<Question> {
        (1..=n)
            .map(|i| Question::new(format!("How would you tackle case {}?", i), four_options(&i.to_string())))
            .collect()
    }

    #[test]
    fn test_log_quiz_writes_one_quiz_and_all_questions() {
        let db = Database::in_memory().unwrap();
        let questions = sample_questions(5);

        let quiz_id = db.log_quiz("Sample", &questions).unwrap();

        assert_eq!(db.quiz_count().unwrap(), 1);
        assert_eq!(db.question_count().unwrap(), 5);

        let conn = db.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT quiz_id, question, option_a, option_b, option_c, option_d FROM questions ORDER BY id")
            .unwrap();
        let rows: Vec<(i64, String, String, String, String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for (row, q) in rows.iter().zip(&questions) {
            assert_eq!(row.0, quiz_id);
            assert_eq!(row.1, q.question);
            assert_eq!(row.2, q.options[0]);
            assert_eq!(row.3, q.options[1]);
            assert_eq!(row.4, q.options[2]);
            assert_eq!(row.5, q.options[3]);
        }
    }

    #[test]
    fn test_log_quiz_trims_title() {
        let db = Database::in_memory().unwrap();
        let id = db.log_quiz("  Sample  ", &sample_questions(1)).unwrap();
        assert_eq!(db.get_quiz(id).unwrap().unwrap().title, "Sample");
    }

    #[test]
    fn test_short_options_rejected_before_any_write() {
        let db = Database::in_memory().unwrap();
        let mut questions = sample_questions(5);
        questions[2].options.truncate(3);

        let err = db.log_quiz("Sample", &questions).unwrap_err();
        assert!(matches!(err, DbError::InvalidOptions { index: 2, found: 3 }));
        assert!(err.is_validation());
        assert!(err.sqlite_detail().is_none());
        assert_eq!(db.quiz_count().unwrap(), 0);
        assert_eq!(db.question_count().unwrap(), 0);
    }

    #[test]
    fn test_too_many_options_rejected() {
        let db = Database::in_memory().unwrap();
        let mut questions = sample_questions(1);
        questions[0].options.push("Approach E".to_string());
        assert!(matches!(
            db.log_quiz("Sample", &questions),
            Err(DbError::InvalidOptions { index: 0, found: 5 })
        ));
    }

    #[test]
    fn test_empty_title_and_no_questions_rejected() {
        let db = Database::in_memory().unwrap();
        assert!(matches!(db.log_quiz("   ", &sample_questions(1)), Err(DbError::EmptyTitle)));
        assert!(matches!(db.log_quiz("Sample", &[]), Err(DbError::NoQuestions)));
        assert_eq!(db.quiz_count().unwrap(), 0);
    }

    #[test]
    fn test_mid_batch_failure_rolls_back_quiz_row() {
        let db = Database::in_memory().unwrap();
        db.conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_on_boom BEFORE INSERT ON questions
                 WHEN NEW.question = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'boom rejected'); END;",
            )
            .unwrap();

        let mut questions = sample_questions(5);
        questions[3].question = "boom".to_string();

        let err = db.log_quiz("Sample", &questions).unwrap_err();
        let detail = err.sqlite_detail().expect("database error carries detail");
        assert!(detail.message.contains("boom rejected"));
        assert!(!err.is_validation());

        assert_eq!(db.quiz_count().unwrap(), 0);
        assert_eq!(db.question_count().unwrap(), 0);
    }

    #[test]
    fn test_get_quiz_returns_questions_in_order() {
        let db = Database::in_memory().unwrap();
        let questions = sample_questions(3);
        let id = db.log_quiz("Ordered", &questions).unwrap();

        let quiz = db.get_quiz(id).unwrap().unwrap();
        assert_eq!(quiz.title, "Ordered");
        assert_eq!(quiz.questions, questions);
        assert!(quiz.created_at > 0);

        assert!(db.get_quiz(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_list_quizzes_newest_first_with_counts() {
        let db = Database::in_memory().unwrap();
        let first = db.log_quiz("First", &sample_questions(2)).unwrap();
        let second = db.log_quiz("Second", &sample_questions(5)).unwrap();

        let list = db.list_quizzes().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second);
        assert_eq!(list[0].question_count, 5);
        assert_eq!(list[1].id, first);
        assert_eq!(list[1].question_count, 2);
    }

    #[test]
    fn test_file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("quiz.db");

        let id = {
            let db = Database::new(&path).unwrap();
            db.log_quiz("Persisted", &sample_questions(5)).unwrap()
        };

        let db = Database::new(&path).unwrap();
        assert_eq!(db.get_path(), path.to_string_lossy());
        assert_eq!(db.get_quiz(id).unwrap().unwrap().questions.len(), 5);
    }

    #[test]
    fn test_unwritable_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        match Database::new(blocker.join("quiz.db")) {
            Err(DbError::Io { path, .. }) => assert_eq!(path, blocker),
            Err(other) => panic!("expected Io error, got {}", other),
            Ok(_) => panic!("database opened under a regular file"),
        }
    }

    #[test]
    fn test_migration_adds_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE quizzes (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
                 INSERT INTO quizzes (title) VALUES ('Old quiz');",
            )
            .unwrap();
        }

        let db = Database::new(&path).unwrap();
        let list = db.list_quizzes().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Old quiz");
        assert_eq!(list[0].created_at, 0);
        assert_eq!(list[0].question_count, 0);
    }
}
