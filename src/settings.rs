//! Application settings
//!
//! Settings live in a JSON file (`settings.json` in the app data directory
//! unless a path is given). Every field has a default, and environment
//! variables take precedence over whatever the file says, so a bare `.env`
//! with an API key is enough to run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::db::OPTION_COLUMNS;
use crate::generator::GenerationConfig;
use crate::utils;

const APP_DIR: &str = "pdf-quiz";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write settings: {0}")]
    Write(String),
    #[error("unknown LLM backend '{0}' (expected groq, openai or anthropic)")]
    UnknownBackend(String),
    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// Which completion API wire format to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Groq,
    OpenAi,
    Anthropic,
}

impl LlmBackend {
    pub fn default_base_url(self) -> &'static str {
        match self {
            LlmBackend::Groq => "https://api.groq.com/openai/v1",
            LlmBackend::OpenAi => "https://api.openai.com/v1",
            LlmBackend::Anthropic => "https://api.anthropic.com",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            LlmBackend::Groq => "llama3-70b-8192",
            LlmBackend::OpenAi => "gpt-4o-mini",
            LlmBackend::Anthropic => "claude-haiku-4-5-20251001",
        }
    }

    /// Environment variable holding this backend's API key
    pub fn api_key_env(self) -> &'static str {
        match self {
            LlmBackend::Groq => "GROQ_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmBackend::Groq => "groq",
            LlmBackend::OpenAi => "openai",
            LlmBackend::Anthropic => "anthropic",
        };
        f.write_str(name)
    }
}

impl FromStr for LlmBackend {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(LlmBackend::Groq),
            "openai" => Ok(LlmBackend::OpenAi),
            "anthropic" => Ok(LlmBackend::Anthropic),
            other => Err(SettingsError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub llm_backend: LlmBackend,
    /// Model identifier (None = backend default)
    #[serde(default)]
    pub model: Option<String>,
    /// Override for the provider base URL (None = backend default)
    #[serde(default)]
    pub llm_base_url: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Source text sent to the model is cut to this many characters
    #[serde(default = "default_max_source_chars")]
    pub max_source_chars: usize,
    #[serde(default = "default_question_count")]
    pub question_count: usize,
    #[serde(default = "default_options_per_question")]
    pub options_per_question: usize,
    /// Characters of extracted text shown before generating
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_source_chars() -> usize {
    3000
}

fn default_question_count() -> usize {
    5
}

fn default_options_per_question() -> usize {
    4
}

fn default_preview_chars() -> usize {
    1000
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_backend: LlmBackend::default(),
            model: None,
            llm_base_url: None,
            groq_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            max_source_chars: default_max_source_chars(),
            question_count: default_question_count(),
            options_per_question: default_options_per_question(),
            preview_chars: default_preview_chars(),
            db_path: None,
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Settings {
    /// Default location of `settings.json`
    pub fn default_config_path() -> PathBuf {
        app_data_dir().join("settings.json")
    }

    /// Load settings from disk, falling back to defaults when the file is missing
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `.env`, the settings file, then apply environment overrides
    pub fn resolve(config_path: Option<&Path>) -> Result<Self, SettingsError> {
        // A missing .env is the normal case in production
        let _ = dotenv::dotenv();

        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);
        let mut settings = Self::load(&path)?;
        settings.apply_env_from(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the rest of the pipeline cannot honour
    pub fn validate(&self) -> Result<(), SettingsError> {
        // Questions are stored in fixed option_a..option_d columns
        if self.options_per_question != OPTION_COLUMNS.len() {
            return Err(SettingsError::InvalidValue {
                name: "options_per_question",
                value: self.options_per_question.to_string(),
            });
        }
        if self.question_count == 0 {
            return Err(SettingsError::InvalidValue {
                name: "question_count",
                value: self.question_count.to_string(),
            });
        }
        Ok(())
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SettingsError::Write(format!("failed to serialize settings: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SettingsError::Write(format!("failed to create config directory: {}", e)))?;
        }

        fs::write(path, content).map_err(|e| SettingsError::Write(e.to_string()))
    }

    /// Apply environment overrides; `lookup` returns the value of a variable
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(backend) = get("PDF_QUIZ_LLM_BACKEND") {
            self.llm_backend = backend.parse()?;
        }
        if let Some(model) = get("PDF_QUIZ_MODEL") {
            self.model = Some(model);
        }
        if let Some(url) = get("PDF_QUIZ_LLM_BASE_URL") {
            self.llm_base_url = Some(url);
        }
        if let Some(key) = get("GROQ_API_KEY") {
            self.groq_api_key = Some(key);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(key);
        }
        if let Some(path) = get("PDF_QUIZ_DB") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(bind) = get("PDF_QUIZ_BIND") {
            self.bind = bind;
        }
        if let Some(secs) = get("PDF_QUIZ_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs.trim().parse().map_err(|_| SettingsError::InvalidValue {
                name: "PDF_QUIZ_REQUEST_TIMEOUT_SECS",
                value: secs.clone(),
            })?;
        }
        Ok(())
    }

    /// API key for the configured backend
    pub fn api_key(&self) -> Option<&str> {
        let key = match self.llm_backend {
            LlmBackend::Groq => self.groq_api_key.as_deref(),
            LlmBackend::OpenAi => self.openai_api_key.as_deref(),
            LlmBackend::Anthropic => self.anthropic_api_key.as_deref(),
        };
        key.filter(|k| !k.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Masked API key for display
    pub fn masked_api_key(&self) -> Option<String> {
        self.api_key().map(utils::mask_secret)
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.llm_backend.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.llm_base_url
            .as_deref()
            .unwrap_or_else(|| self.llm_backend.default_base_url())
            .trim_end_matches('/')
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| app_data_dir().join("pdf-quiz.db"))
    }

    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            max_source_chars: self.max_source_chars,
            question_count: self.question_count,
            options_per_question: self.options_per_question,
        }
    }
}

fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}
