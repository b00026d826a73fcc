//! PDF quiz CLI - the extract / generate / log pipeline from a terminal
//!
//! Usage: pdf-quiz-cli [OPTIONS] <COMMAND>
//!
//! Supports JSON output for scripting.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use pdf_quiz_lib::ai_client;
use pdf_quiz_lib::db::{Database, DbError, Question};
use pdf_quiz_lib::generator::{self, QuizDraft};
use pdf_quiz_lib::pdf_extractor::{self, ExtractedText};
use pdf_quiz_lib::settings::Settings;
use pdf_quiz_lib::utils;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "pdf-quiz-cli")]
#[command(version, about = "Generate approach-based questions from PDFs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Database path (default: from settings)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Settings file (default: <data dir>/pdf-quiz/settings.json)
    #[arg(long, global = true, env = "PDF_QUIZ_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the text of a PDF
    Extract {
        /// PDF file
        pdf: PathBuf,
        /// Characters to preview (default: from settings)
        #[arg(long)]
        preview: Option<usize>,
    },
    /// Generate questions from a PDF without logging them
    Generate {
        /// PDF file
        pdf: PathBuf,
        /// Write the draft as JSON to this file
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Log a draft written by `generate --out`
    Log {
        /// Draft JSON file (a draft or a bare question array)
        draft: PathBuf,
        /// Quiz title
        #[arg(long, short)]
        title: String,
    },
    /// Extract, generate and log in one go
    Run {
        /// PDF file
        pdf: PathBuf,
        /// Quiz title
        #[arg(long, short)]
        title: String,
        /// Log even when generation fell back to placeholder questions
        #[arg(long)]
        allow_placeholder: bool,
    },
    /// Logged quizzes
    Quizzes {
        #[command(subcommand)]
        cmd: QuizCommands,
    },
    /// Settings file
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum QuizCommands {
    /// List logged quizzes, newest first
    List,
    /// Show one quiz with its questions
    Show {
        /// Quiz id
        id: i64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show effective settings (API keys masked)
    Show,
    /// Write a settings file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct ConfigJson {
    config_path: String,
    llm_backend: String,
    model: String,
    base_url: String,
    api_key_set: bool,
    api_key: Option<String>,
    db_path: String,
    bind: String,
    max_source_chars: usize,
    question_count: usize,
    options_per_question: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractJson<'a> {
    file: String,
    page_count: usize,
    char_len: usize,
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoggedJson<'a> {
    id: i64,
    title: &'a str,
    questions: usize,
    placeholder: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "pdf_quiz_lib=debug,pdf_quiz_cli=debug"
    } else {
        "pdf_quiz_lib=warn,pdf_quiz_cli=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<(), String> {
    // Handle completions first (no settings or DB needed)
    if let Commands::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "pdf-quiz-cli", &mut std::io::stdout());
        return Ok(());
    }

    let config_path = cli.config.clone().unwrap_or_else(Settings::default_config_path);

    // Init must work even when the existing file is unreadable
    if let Commands::Config { cmd: ConfigCommands::Init { force } } = &cli.command {
        return handle_config_init(&config_path, *force);
    }

    let mut settings = Settings::resolve(Some(config_path.as_path())).map_err(|e| e.to_string())?;
    if let Some(db) = cli.db {
        settings.db_path = Some(db);
    }

    if cli.verbose {
        eprintln!("[verbose] Using database: {:?}", settings.db_path());
        eprintln!(
            "[verbose] Backend: {} ({}), key: {}",
            settings.llm_backend,
            settings.model(),
            settings.masked_api_key().unwrap_or_else(|| "not set".to_string())
        );
    }

    match cli.command {
        Commands::Extract { pdf, preview } => handle_extract(&pdf, preview, &settings, cli.json),
        Commands::Generate { pdf, out } => handle_generate(&pdf, out.as_deref(), &settings, cli.json).await,
        Commands::Log { draft, title } => handle_log(&draft, &title, &settings, cli.json),
        Commands::Run { pdf, title, allow_placeholder } => {
            handle_run(&pdf, &title, allow_placeholder, &settings, cli.json).await
        }
        Commands::Quizzes { cmd } => handle_quizzes(cmd, &settings, cli.json),
        Commands::Config { .. } => handle_config_show(&config_path, &settings, cli.json),
        Commands::Completions { .. } => unreachable!(), // handled above
    }
}

fn open_database(settings: &Settings) -> Result<Database, String> {
    let path = settings.db_path();
    let db = Database::new(&path).map_err(|e| format!("Failed to open database {}: {}", path.display(), e))?;
    tracing::debug!(path = %db.get_path(), "database opened");
    Ok(db)
}

fn extract_file(pdf: &Path) -> Result<ExtractedText, String> {
    let bytes = fs::read(pdf).map_err(|e| format!("Failed to read {}: {}", pdf.display(), e))?;
    pdf_extractor::extract_text(&bytes).map_err(|e| format!("{}: {}", pdf.display(), e))
}

async fn generate_draft(pdf: &Path, settings: &Settings) -> Result<QuizDraft, String> {
    let extracted = extract_file(pdf)?;
    if extracted.is_blank() {
        return Err(format!("{}: no extractable text (scanned or image-only PDF?)", pdf.display()));
    }
    let client = ai_client::build_client(settings).map_err(|e| e.to_string())?;
    generator::generate_questions(client.as_ref(), &extracted.text, &settings.generation())
        .await
        .map_err(|e| format!("Question generation failed: {}", e))
}

fn format_questions(questions: &[Question]) -> String {
    let mut out = String::new();
    for (i, q) in questions.iter().enumerate() {
        out.push_str(&format!("Question {}: {}\n", i + 1, q.question));
        for (j, option) in q.options.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", generator::option_letter(j), option));
        }
        out.push('\n');
    }
    out
}

fn print_questions(questions: &[Question]) {
    print!("{}", format_questions(questions));
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", out);
    Ok(())
}

fn warn_placeholder(draft: &QuizDraft) {
    if draft.is_placeholder() {
        eprintln!("Warning: automatic JSON parsing failed, showing generic placeholder questions.");
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn handle_extract(pdf: &Path, preview: Option<usize>, settings: &Settings, json: bool) -> Result<(), String> {
    let extracted = extract_file(pdf)?;

    if json {
        return print_json(&ExtractJson {
            file: pdf.display().to_string(),
            page_count: extracted.page_count,
            char_len: extracted.char_len(),
            text: &extracted.text,
        });
    }

    let preview_chars = preview.unwrap_or(settings.preview_chars);
    println!("{}", extracted.preview(preview_chars));
    println!();
    println!(
        "Total text length: {} characters ({} pages)",
        extracted.char_len(),
        extracted.page_count
    );
    if extracted.is_blank() {
        eprintln!("Warning: no text could be extracted. The PDF may be scanned or image-only.");
    }
    Ok(())
}

async fn handle_generate(pdf: &Path, out: Option<&Path>, settings: &Settings, json: bool) -> Result<(), String> {
    let draft = generate_draft(pdf, settings).await?;

    if let Some(out) = out {
        let content = serde_json::to_string_pretty(&draft).map_err(|e| e.to_string())?;
        fs::write(out, content).map_err(|e| format!("Failed to write {}: {}", out.display(), e))?;
        eprintln!("Draft written to {}", out.display());
    }

    if json {
        return print_json(&draft);
    }

    warn_placeholder(&draft);
    print_questions(&draft.questions);
    Ok(())
}

/// Accepts a full draft or a bare array of questions
fn read_draft(path: &Path) -> Result<QuizDraft, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    if let Ok(draft) = serde_json::from_str::<QuizDraft>(&content) {
        return Ok(draft);
    }
    let questions: Vec<Question> = serde_json::from_str(&content)
        .map_err(|e| format!("{} is not a quiz draft: {}", path.display(), e))?;
    Ok(QuizDraft {
        questions,
        source: generator::DraftSource::Parsed,
    })
}

/// Validation errors read as-is; SQLite failures carry code and message
fn describe_db_error(e: &DbError) -> String {
    match e.sqlite_detail() {
        Some(detail) => format!("Database error (code: {}, message: {})", detail.code, detail.message),
        None => e.to_string(),
    }
}

/// Placeholder drafts are only logged when explicitly allowed
fn ensure_loggable(draft: &QuizDraft, allow_placeholder: bool) -> Result<(), String> {
    if draft.is_placeholder() && !allow_placeholder {
        return Err(
            "automatic JSON parsing failed; refusing to log placeholder questions (use --allow-placeholder)"
                .to_string(),
        );
    }
    Ok(())
}

fn log_draft(draft: &QuizDraft, title: &str, settings: &Settings, json: bool) -> Result<(), String> {
    let db = open_database(settings)?;
    let id = db
        .log_quiz(title, &draft.questions)
        .map_err(|e| describe_db_error(&e))?;

    if json {
        return print_json(&LoggedJson {
            id,
            title: title.trim(),
            questions: draft.questions.len(),
            placeholder: draft.is_placeholder(),
        });
    }
    println!("Quiz data logged successfully! (id {}, {} questions)", id, draft.questions.len());
    Ok(())
}

fn handle_log(path: &Path, title: &str, settings: &Settings, json: bool) -> Result<(), String> {
    let draft = read_draft(path)?;
    log_draft(&draft, title, settings, json)
}

async fn handle_run(
    pdf: &Path,
    title: &str,
    allow_placeholder: bool,
    settings: &Settings,
    json: bool,
) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("Please enter a quiz title.".to_string());
    }

    let draft = generate_draft(pdf, settings).await?;
    ensure_loggable(&draft, allow_placeholder)?;

    if !json {
        warn_placeholder(&draft);
        print_questions(&draft.questions);
    }
    log_draft(&draft, title, settings, json)
}

fn handle_quizzes(cmd: QuizCommands, settings: &Settings, json: bool) -> Result<(), String> {
    let db = open_database(settings)?;

    match cmd {
        QuizCommands::List => {
            let quizzes = db.list_quizzes().map_err(|e| e.to_string())?;
            if json {
                return print_json(&quizzes);
            }
            if quizzes.is_empty() {
                println!("No quizzes have been logged yet.");
                return Ok(());
            }
            for quiz in &quizzes {
                println!(
                    "{:>5}  {:<40}  {} questions",
                    quiz.id,
                    utils::truncate_chars(&quiz.title, 40),
                    quiz.question_count
                );
            }
            Ok(())
        }
        QuizCommands::Show { id } => {
            let quiz = db
                .get_quiz(id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("Quiz {} not found", id))?;
            if json {
                return print_json(&quiz);
            }
            println!("{} (id {})", quiz.title, quiz.id);
            println!();
            print_questions(&quiz.questions);
            Ok(())
        }
    }
}

fn handle_config_show(config_path: &Path, settings: &Settings, json: bool) -> Result<(), String> {
    let view = ConfigJson {
        config_path: config_path.display().to_string(),
        llm_backend: settings.llm_backend.to_string(),
        model: settings.model().to_string(),
        base_url: settings.base_url().to_string(),
        api_key_set: settings.has_api_key(),
        api_key: settings.masked_api_key(),
        db_path: settings.db_path().display().to_string(),
        bind: settings.bind.clone(),
        max_source_chars: settings.max_source_chars,
        question_count: settings.question_count,
        options_per_question: settings.options_per_question,
    };

    if json {
        return print_json(&view);
    }

    println!("Config file:   {}", view.config_path);
    println!("Backend:       {} ({})", view.llm_backend, view.model);
    println!("Base URL:      {}", view.base_url);
    match &view.api_key {
        Some(masked) => println!("API key:       {}", masked),
        None => println!("API key:       not set ({})", settings.llm_backend.api_key_env()),
    }
    if !view.api_key_set {
        eprintln!("Warning: question generation needs {}.", settings.llm_backend.api_key_env());
    }
    println!("Database:      {}", view.db_path);
    println!("Bind:          {}", view.bind);
    println!(
        "Generation:    {} questions x {} options from the first {} characters",
        view.question_count, view.options_per_question, view.max_source_chars
    );
    Ok(())
}

fn handle_config_init(config_path: &Path, force: bool) -> Result<(), String> {
    if config_path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        ));
    }
    // Defaults only: keys from the environment are never written to disk
    Settings::default().save(config_path).map_err(|e| e.to_string())?;
    println!("Wrote default settings to {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pdf-quiz-cli", "quizzes", "show", "7", "--json", "--db", "/tmp/q.db"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/q.db")));
        assert!(matches!(cli.command, Commands::Quizzes { cmd: QuizCommands::Show { id: 7 } }));
    }

    #[test]
    fn test_run_requires_title() {
        assert!(Cli::try_parse_from(["pdf-quiz-cli", "run", "doc.pdf"]).is_err());
    }

    #[test]
    fn test_read_draft_accepts_bare_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.json");
        fs::write(
            &path,
            r#"[{"question": "How?", "options": ["a", "b", "c", "d"]}]"#,
        )
        .unwrap();
        let draft = read_draft(&path).unwrap();
        assert_eq!(draft.questions.len(), 1);
        assert!(!draft.is_placeholder());
    }

    #[test]
    fn test_read_draft_keeps_placeholder_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.json");
        let draft = QuizDraft {
            questions: generator::placeholder_questions(&Default::default()),
            source: generator::DraftSource::Placeholder,
        };
        fs::write(&path, serde_json::to_string(&draft).unwrap()).unwrap();
        assert!(read_draft(&path).unwrap().is_placeholder());
    }

    #[test]
    fn test_placeholder_draft_needs_explicit_permission() {
        let placeholder = QuizDraft {
            questions: generator::placeholder_questions(&Default::default()),
            source: generator::DraftSource::Placeholder,
        };
        let err = ensure_loggable(&placeholder, false).unwrap_err();
        assert!(err.contains("--allow-placeholder"));
        assert!(ensure_loggable(&placeholder, true).is_ok());

        let parsed = QuizDraft {
            source: generator::DraftSource::Parsed,
            ..placeholder
        };
        assert!(ensure_loggable(&parsed, false).is_ok());
    }

    #[test]
    fn test_describe_db_error_includes_sqlite_code_and_message() {
        let err = DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("NOT NULL constraint failed: questions.option_d".to_string()),
        ));
        let text = describe_db_error(&err);
        assert!(text.starts_with("Database error (code: ConstraintViolation"));
        assert!(text.contains("message: NOT NULL constraint failed: questions.option_d"));

        assert_eq!(describe_db_error(&DbError::EmptyTitle), "quiz title is empty");
    }

    #[test]
    fn test_config_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("settings.json");

        handle_config_init(&path, false).unwrap();
        let written = Settings::load(&path).unwrap();
        assert_eq!(written.question_count, 5);
        assert!(written.groq_api_key.is_none());

        assert!(handle_config_init(&path, false).is_err());
        assert!(handle_config_init(&path, true).is_ok());
    }

    #[test]
    fn test_format_questions_labels_every_option() {
        let options: Vec<String> = (1..=5).map(|i| format!("way {}", i)).collect();
        let text = format_questions(&[Question::new("How?", options)]);
        assert!(text.starts_with("Question 1: How?\n"));
        assert!(text.contains("  A. way 1\n"));
        assert!(text.contains("  E. way 5\n"));
    }

    #[test]
    fn test_config_commands_parse() {
        let cli = Cli::try_parse_from(["pdf-quiz-cli", "config", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { cmd: ConfigCommands::Init { force: true } }));
    }

    #[test]
    fn test_read_draft_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.json");
        fs::write(&path, "not json").unwrap();
        assert!(read_draft(&path).is_err());
    }
}
