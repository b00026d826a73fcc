//! PDF quiz server: upload a PDF, generate approach-based questions, log them.
//!
//! Usage:
//!   GROQ_API_KEY=... pdf-quiz-server
//!
//! Or with args:
//!   pdf-quiz-server --db /path/to/pdf-quiz.db --bind 0.0.0.0:8501

use clap::Parser;
use pdf_quiz_lib::ai_client;
use pdf_quiz_lib::db::Database;
use pdf_quiz_lib::settings::Settings;
use pdf_quiz_lib::web::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "pdf_quiz_lib=info,pdf_quiz_server=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "pdf-quiz-server")]
#[command(version, about = "Web UI for generating approach-based questions from PDFs")]
struct Args {
    /// Database path (overrides settings)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Address to bind to (overrides settings)
    #[arg(long)]
    bind: Option<String>,

    /// Settings file (default: <data dir>/pdf-quiz/settings.json)
    #[arg(long, env = "PDF_QUIZ_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let mut settings = Settings::resolve(args.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(db) = args.db {
        settings.db_path = Some(db);
    }
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }

    let db_path = settings.db_path();
    let db = Database::new(&db_path)
        .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))?;
    tracing::info!(path = %db_path.display(), quizzes = db.quiz_count().unwrap_or(0), "database ready");

    let client = match ai_client::build_client(&settings) {
        Ok(client) => {
            tracing::info!(
                backend = %client.backend(),
                model = client.model(),
                api_key = %settings.masked_api_key().unwrap_or_default(),
                "completion client ready"
            );
            Some(client)
        }
        Err(e) => {
            tracing::warn!("question generation disabled: {}", e);
            None
        }
    };

    let bind_addr = settings.bind.clone();
    let state = AppState {
        db: Arc::new(db),
        client,
        settings: Arc::new(settings),
    };
    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", bind_addr, e))?;

    tracing::info!("listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", e))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutting down");
    }
}
