//! Single-page web UI and JSON API
//!
//! Routes:
//! - GET  /                  upload form
//! - POST /extract           multipart PDF upload, shows preview + generate button
//! - POST /generate          generates questions, shows them + log form
//! - POST /log               persists the draft under a title
//! - GET  /quizzes[/{id}]    logged quizzes
//! - POST /api/extract, POST /api/generate, GET|POST /api/quizzes, GET /api/quizzes/{id}
//! - GET  /health
//!
//! Nothing is kept server-side between requests: the generated draft travels
//! to the browser as JSON in a hidden field and comes back with the title.

pub mod views;

use axum::{
    extract::{DefaultBodyLimit, Form, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use maud::{html, Markup};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::ai_client::{CompletionClient, CompletionError};
use crate::db::{Database, DbError, Question, QuizSummary, StoredQuiz};
use crate::generator::{self, QuizDraft};
use crate::pdf_extractor::{self, ExtractError, ExtractedText};
use crate::settings::Settings;
use crate::utils;
use views::{Banner, ExtractedView};

// ============================================================================
// AppState
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    /// None when no API key is configured; generation then reports the missing key
    pub client: Option<Arc<dyn CompletionClient>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    async fn generate(&self, text: &str) -> Result<QuizDraft, CompletionError> {
        let client = self.client.as_ref().ok_or(CompletionError::MissingApiKey(
            self.settings.llm_backend.api_key_env(),
        ))?;
        generator::generate_questions(client.as_ref(), text, &self.settings.generation()).await
    }
}

// ============================================================================
// Error type (JSON API)
// ============================================================================

pub struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({"error": self.1}))).into_response()
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        if e.is_validation() {
            AppError(StatusCode::BAD_REQUEST, e.to_string())
        } else {
            tracing::error!("database error: {}", e);
            AppError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

impl From<CompletionError> for AppError {
    fn from(e: CompletionError) -> Self {
        tracing::error!("question generation failed: {}", e);
        let status = match e {
            CompletionError::MissingApiKey(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        AppError(status, e.to_string())
    }
}

impl From<ExtractError> for AppError {
    fn from(e: ExtractError) -> Self {
        AppError(StatusCode::BAD_REQUEST, e.to_string())
    }
}

fn not_found(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::NOT_FOUND, msg.into())
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
struct GenerateForm {
    source_text: String,
}

#[derive(Deserialize)]
struct LogForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    draft: String,
}

#[derive(Deserialize)]
struct GenerateRequest {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractResponse {
    text: String,
    page_count: usize,
    char_len: usize,
}

#[derive(Deserialize)]
struct LogRequest {
    title: String,
    questions: Vec<Question>,
}

#[derive(Serialize)]
struct LogResponse {
    id: i64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    quizzes: i64,
    llm_configured: bool,
}

// ============================================================================
// Helpers
// ============================================================================

const MISSING_INPUT_WARNING: &str = "Please enter a quiz title and generate questions first.";

async fn read_upload(multipart: &mut Multipart) -> Result<Vec<u8>, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("failed to read upload: {}", e))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| format!("failed to read upload: {}", e))?;
            return Ok(bytes.to_vec());
        }
    }
    Err("no file was uploaded".to_string())
}

/// PDF parsing is CPU-bound; keep it off the async workers
async fn extract_blocking(bytes: Vec<u8>) -> Result<ExtractedText, ExtractError> {
    tokio::task::spawn_blocking(move || pdf_extractor::extract_text(&bytes))
        .await
        .map_err(|e| ExtractError::Parse(format!("PDF parser crashed: {}", e)))?
}

fn render(title: &str, status: StatusCode, banners: &[Banner], body: Markup) -> Response {
    let markup = views::page(
        title,
        html! {
            (views::banners(banners))
            (body)
        },
    );
    (status, markup).into_response()
}

fn db_banner(e: &DbError) -> Banner {
    if e.is_validation() {
        return Banner::warning(e.to_string());
    }
    match e.sqlite_detail() {
        Some(detail) => Banner::error(format!(
            "Database error: {} (code: {}, message: {})",
            e, detail.code, detail.message
        )),
        None => Banner::error(format!("Unexpected error logging quiz data: {}", e)),
    }
}

/// Questions plus the log form for a draft
fn draft_body(draft: &QuizDraft, title: &str) -> Result<Markup, serde_json::Error> {
    let draft_json = serde_json::to_string(draft)?;
    Ok(html! {
        h2 { "Generated Questions" }
        (views::question_list(&draft.questions))
        (views::log_form(&draft_json, title))
    })
}

// ============================================================================
// HTML handlers
// ============================================================================

// GET /
async fn index_handler() -> Response {
    render("Upload", StatusCode::OK, &[], views::upload_form())
}

// POST /extract
async fn extract_page_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let bytes = match read_upload(&mut multipart).await {
        Ok(bytes) => bytes,
        Err(msg) => {
            return render("Upload", StatusCode::BAD_REQUEST, &[Banner::error(msg)], views::upload_form());
        }
    };

    let extracted = match extract_blocking(bytes).await {
        Ok(extracted) => extracted,
        Err(e) => {
            tracing::error!("text extraction failed: {}", e);
            return render(
                "Upload",
                StatusCode::BAD_REQUEST,
                &[Banner::error(e.to_string())],
                views::upload_form(),
            );
        }
    };

    let mut banners = Vec::new();
    if extracted.is_blank() {
        banners.push(Banner::warning(
            "No text could be extracted from this PDF. It may be scanned or image-only.",
        ));
    }

    let view = ExtractedView {
        preview: extracted.preview(state.settings.preview_chars),
        preview_chars: state.settings.preview_chars,
        total_chars: extracted.char_len(),
        page_count: extracted.page_count,
        source_text: utils::truncate_chars(&extracted.text, state.settings.max_source_chars),
    };

    render("Extracted Text", StatusCode::OK, &banners, views::extracted_section(&view))
}

// POST /generate
async fn generate_page_handler(State(state): State<AppState>, Form(form): Form<GenerateForm>) -> Response {
    let draft = match state.generate(&form.source_text).await {
        Ok(draft) => draft,
        Err(e) => {
            tracing::error!("question generation failed: {}", e);
            return render(
                "Generate",
                StatusCode::BAD_GATEWAY,
                &[Banner::error(format!("An unexpected error occurred: {}", e))],
                views::upload_form(),
            );
        }
    };

    let banners = if draft.is_placeholder() {
        vec![Banner::warning(
            "Automatic JSON parsing failed. Showing generic placeholder questions.",
        )]
    } else {
        Vec::new()
    };

    match draft_body(&draft, "") {
        Ok(body) => render("Questions", StatusCode::OK, &banners, body),
        Err(e) => render(
            "Questions",
            StatusCode::INTERNAL_SERVER_ERROR,
            &[Banner::error(format!("Failed to encode questions: {}", e))],
            views::upload_form(),
        ),
    }
}

// POST /log
async fn log_page_handler(State(state): State<AppState>, Form(form): Form<LogForm>) -> Response {
    let draft = match serde_json::from_str::<QuizDraft>(&form.draft) {
        Ok(draft) if !draft.questions.is_empty() => draft,
        _ => {
            return render(
                "Log Quiz",
                StatusCode::BAD_REQUEST,
                &[Banner::warning(MISSING_INPUT_WARNING)],
                views::upload_form(),
            );
        }
    };

    if form.title.trim().is_empty() {
        let body = draft_body(&draft, "").unwrap_or_else(|_| views::upload_form());
        return render(
            "Log Quiz",
            StatusCode::BAD_REQUEST,
            &[Banner::warning(MISSING_INPUT_WARNING)],
            body,
        );
    }

    match state.db.log_quiz(&form.title, &draft.questions) {
        Ok(id) => {
            tracing::info!(quiz_id = id, title = %form.title.trim(), "quiz logged from web UI");
            render(
                "Quiz Logged",
                StatusCode::OK,
                &[Banner::success("Quiz data logged successfully!")],
                html! {
                    p { a href=(format!("/quizzes/{}", id)) { "View the logged quiz" } }
                    (views::upload_form())
                },
            )
        }
        Err(e) => {
            tracing::error!("failed to log quiz: {}", e);
            let status = if e.is_validation() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let body = draft_body(&draft, &form.title).unwrap_or_else(|_| views::upload_form());
            render("Log Quiz", status, &[db_banner(&e)], body)
        }
    }
}

// GET /quizzes
async fn quizzes_page_handler(State(state): State<AppState>) -> Response {
    match state.db.list_quizzes() {
        Ok(quizzes) => render("Logged quizzes", StatusCode::OK, &[], views::quiz_list(&quizzes)),
        Err(e) => {
            tracing::error!("failed to list quizzes: {}", e);
            render("Logged quizzes", StatusCode::INTERNAL_SERVER_ERROR, &[db_banner(&e)], html! {})
        }
    }
}

// GET /quizzes/{id}
async fn quiz_page_handler(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.db.get_quiz(id) {
        Ok(Some(quiz)) => render(&quiz.title, StatusCode::OK, &[], views::quiz_detail(&quiz)),
        Ok(None) => render(
            "Not found",
            StatusCode::NOT_FOUND,
            &[Banner::error(format!("Quiz {} not found", id))],
            html! {},
        ),
        Err(e) => {
            tracing::error!("failed to load quiz {}: {}", id, e);
            render("Quiz", StatusCode::INTERNAL_SERVER_ERROR, &[db_banner(&e)], html! {})
        }
    }
}

// ============================================================================
// JSON handlers
// ============================================================================

// POST /api/extract
async fn extract_api_handler(mut multipart: Multipart) -> Result<Json<ExtractResponse>, AppError> {
    let bytes = read_upload(&mut multipart)
        .await
        .map_err(|msg| AppError(StatusCode::BAD_REQUEST, msg))?;
    let extracted = extract_blocking(bytes).await?;
    Ok(Json(ExtractResponse {
        char_len: extracted.char_len(),
        page_count: extracted.page_count,
        text: extracted.text,
    }))
}

// POST /api/generate
async fn generate_api_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<QuizDraft>, AppError> {
    Ok(Json(state.generate(&req.text).await?))
}

// POST /api/quizzes
async fn log_api_handler(
    State(state): State<AppState>,
    Json(req): Json<LogRequest>,
) -> Result<(StatusCode, Json<LogResponse>), AppError> {
    let id = state.db.log_quiz(&req.title, &req.questions)?;
    Ok((StatusCode::CREATED, Json(LogResponse { id })))
}

// GET /api/quizzes
async fn list_api_handler(State(state): State<AppState>) -> Result<Json<Vec<QuizSummary>>, AppError> {
    Ok(Json(state.db.list_quizzes()?))
}

// GET /api/quizzes/{id}
async fn get_api_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StoredQuiz>, AppError> {
    state
        .db
        .get_quiz(id)?
        .map(Json)
        .ok_or_else(|| not_found(format!("Quiz {} not found", id)))
}

// GET /health
async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        quizzes: state.db.quiz_count()?,
        llm_configured: state.client.is_some(),
    }))
}

pub fn router(state: AppState) -> Router {
    let max_upload = state.settings.max_upload_bytes;

    Router::new()
        .route("/", get(index_handler))
        .route("/extract", post(extract_page_handler))
        .route("/generate", post(generate_page_handler))
        .route("/log", post(log_page_handler))
        .route("/quizzes", get(quizzes_page_handler))
        .route("/quizzes/{id}", get(quiz_page_handler))
        .route("/api/extract", post(extract_api_handler))
        .route("/api/generate", post(generate_api_handler))
        .route("/api/quizzes", post(log_api_handler).get(list_api_handler))
        .route("/api/quizzes/{id}", get(get_api_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
