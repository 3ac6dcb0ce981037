use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, detail(&msg)).into_response(),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, detail(&msg)).into_response()
            }
        }
    }
}

fn detail(msg: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "detail": msg }))
}

/// Errors raised by LLM providers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    #[error("LLM features are disabled")]
    Disabled,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("LLM request timed out")]
    Timeout,
    #[error("rate limited by LLM provider")]
    RateLimited,
    #[error("LLM API error: HTTP {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Timeouts, rate limits, network errors and 5xx replies may succeed on
    /// a later attempt. Client errors will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout | LlmError::RateLimited | LlmError::NetworkError(_) => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Disabled | LlmError::InvalidResponse(_) => false,
        }
    }
}

/// Errors from LLM-backed classifiers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifierError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("ambiguous classifier output: {0}")]
    Ambiguous(String),
    #[error("classifier output has no answer: {0}")]
    Invalid(String),
}

/// Errors raised by web search and knowledge-base retrieval
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("bad response: {0}")]
    BadResponse(String),
}
