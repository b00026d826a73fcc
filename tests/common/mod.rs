#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use pdf_quiz_lib::ai_client::{CompletionClient, CompletionError};
use pdf_quiz_lib::db::Database;
use pdf_quiz_lib::settings::{LlmBackend, Settings};
use pdf_quiz_lib::web::{router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

/// Completion client that always answers with the same text
pub struct Scripted(pub String);

#[async_trait]
impl CompletionClient for Scripted {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Ok(self.0.clone())
    }

    fn backend(&self) -> LlmBackend {
        LlmBackend::Groq
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

pub struct TestApp {
    pub app: axum::Router,
    pub db: Arc<Database>,
}

pub fn test_app(reply: Option<&str>) -> TestApp {
    test_app_with(reply, Settings::default())
}

pub fn test_app_with(reply: Option<&str>, settings: Settings) -> TestApp {
    let db = Arc::new(Database::in_memory().expect("in-memory database"));
    let client = reply.map(|r| Arc::new(Scripted(r.to_string())) as Arc<dyn CompletionClient>);
    let state = AppState {
        db: db.clone(),
        client,
        settings: Arc::new(settings),
    };
    TestApp { app: router(state), db }
}

pub const THREE_PAGE_PDF: &[u8] = include_bytes!("../fixtures/three_pages.pdf");

pub fn five_questions_json() -> String {
    let questions: Vec<serde_json::Value> = (1..=5)
        .map(|i| {
            serde_json::json!({
                "question": format!("How would you plan stage {}?", i),
                "options": ["Iterate", "Prototype", "Survey users", "Benchmark"]
            })
        })
        .collect();
    serde_json::Value::Array(questions).to_string()
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.expect("router should respond")
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn form_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    Request::post(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request build should succeed")
}

pub fn json_request(uri: &str, value: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(value.to_string()))
        .expect("request build should succeed")
}

pub fn multipart_request(uri: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let boundary = "pdfquizboundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::post(uri)
        .header("content-type", format!("multipart/form-data; boundary={}", boundary))
        .header("content-length", body.len())
        .body(Body::from(body))
        .expect("request build should succeed")
}
