use chrono::{TimeZone, Utc};
use maud::{html, Markup, DOCTYPE};

use crate::db::{Question, QuizSummary, StoredQuiz};

const APP_TITLE: &str = "PDF Approach-Based Question Generator";
const VERSION: &str = env!("CARGO_PKG_VERSION");

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 52rem; margin: 0 auto; padding: 1rem; line-height: 1.5; }
header nav { display: flex; justify-content: space-between; border-bottom: 1px solid #ccc; margin-bottom: 1rem; }
.banner { padding: .6rem 1rem; border-radius: .3rem; margin: .8rem 0; }
.banner.success { background: #e3f6e5; color: #14532d; }
.banner.error { background: #fde8e8; color: #7f1d1d; }
.banner.warning { background: #fff7db; color: #713f12; }
textarea { width: 100%; font-family: monospace; }
.question { border-bottom: 1px solid #eee; padding-bottom: .6rem; }
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

impl Banner {
    pub fn success(message: impl Into<String>) -> Self {
        Self { kind: BannerKind::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: BannerKind::Error, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { kind: BannerKind::Warning, message: message.into() }
    }
}

fn header() -> Markup {
    html! {
        header {
            nav {
                a href="/" { strong { (APP_TITLE) } }
                span {
                    a href="/quizzes" { "Logged quizzes" }
                    " · v" (VERSION)
                }
            }
        }
    }
}

pub fn page(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " - " (APP_TITLE) }
                style { (maud::PreEscaped(STYLE)) }
            }
            body {
                (header())
                main { (body) }
            }
        }
    }
}

fn banner_class(kind: BannerKind) -> &'static str {
    match kind {
        BannerKind::Success => "banner success",
        BannerKind::Error => "banner error",
        BannerKind::Warning => "banner warning",
    }
}

pub fn banners(banners: &[Banner]) -> Markup {
    html! {
        @for banner in banners {
            div class=(banner_class(banner.kind)) role="status" { (banner.message) }
        }
    }
}

pub fn upload_form() -> Markup {
    html! {
        h2 { "Upload a PDF file" }
        form method="post" action="/extract" enctype="multipart/form-data" {
            input type="file" name="file" accept=".pdf,application/pdf" required;
            button type="submit" { "Extract text" }
        }
    }
}

pub struct ExtractedView<'a> {
    pub preview: &'a str,
    pub preview_chars: usize,
    pub total_chars: usize,
    pub page_count: usize,
    /// Text handed to the generate step (already cut to the generator's limit)
    pub source_text: &'a str,
}

pub fn extracted_section(view: &ExtractedView<'_>) -> Markup {
    html! {
        h2 { "Extracted Text" }
        label {
            "Extracted Text Preview (First " (view.preview_chars) " characters)"
            textarea readonly rows="10" { (view.preview) }
        }
        p { "Total text length: " (view.total_chars) " characters (" (view.page_count) " pages)" }

        h2 { "Generate Approach-Based Questions" }
        form method="post" action="/generate" {
            input type="hidden" name="source_text" value=(view.source_text);
            button type="submit" { "Generate Questions" }
        }
    }
}

pub fn question_list(questions: &[Question]) -> Markup {
    html! {
        @for (i, q) in questions.iter().enumerate() {
            div.question {
                p { strong { "Question " (i + 1) ":" } " " (q.question) }
                p { "Possible Approaches:" }
                ul {
                    @for option in &q.options {
                        li { (option) }
                    }
                }
            }
        }
    }
}

/// Quiz title input plus the serialized draft
pub fn log_form(draft_json: &str, title: &str) -> Markup {
    html! {
        h2 { "Quiz Details" }
        form method="post" action="/log" {
            label {
                "Enter Quiz Title"
                input type="text" name="title" value=(title);
            }
            input type="hidden" name="draft" value=(draft_json);
            button type="submit" { "Log Quiz" }
        }
    }
}

fn format_timestamp(millis: i64) -> String {
    if millis <= 0 {
        return "unknown".to_string();
    }
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn quiz_list(quizzes: &[QuizSummary]) -> Markup {
    html! {
        h2 { "Logged quizzes" }
        @if quizzes.is_empty() {
            p { "No quizzes have been logged yet." }
        } @else {
            table {
                thead { tr { th { "Title" } th { "Questions" } th { "Logged" } } }
                tbody {
                    @for quiz in quizzes {
                        tr {
                            td { a href=(format!("/quizzes/{}", quiz.id)) { (quiz.title) } }
                            td { (quiz.question_count) }
                            td { (format_timestamp(quiz.created_at)) }
                        }
                    }
                }
            }
        }
    }
}

pub fn quiz_detail(quiz: &StoredQuiz) -> Markup {
    html! {
        h2 { (quiz.title) }
        p { "Logged " (format_timestamp(quiz.created_at)) }
        (question_list(&quiz.questions))
        p { a href="/quizzes" { "Back to all quizzes" } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_text_is_escaped() {
        let questions = vec![Question::new(
            "<script>alert(1)</script>",
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
        )];
        let html = question_list(&questions).into_string();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_banner_classes() {
        let html = banners(&[Banner::warning("careful"), Banner::error("broken")]).into_string();
        assert!(html.contains("banner warning"));
        assert!(html.contains("banner error"));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "unknown");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13 UTC");
    }
}
