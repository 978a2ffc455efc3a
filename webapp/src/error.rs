use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

/// Web application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("FATAL: could not load required key {0} from config")]
    MissingRequiredConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed id token: {0}")]
    TokenParse(String),

    #[error("Login state is missing, mismatched or expired")]
    StateMismatch,

    #[error("Id token nonce does not match the login request")]
    NonceMismatch,

    #[error("Invalid login callback: {0}")]
    InvalidCallback(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Directory request failed: {0}")]
    Graph(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<AppError> for StatusCode {
    fn from(err: AppError) -> Self {
        From::from(&err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status: StatusCode = From::from(&self);
        let body = format!("{}", self);
        (status, body).into_response()
    }
}

impl From<&AppError> for StatusCode {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::MissingRequiredConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TokenParse(_) => StatusCode::BAD_REQUEST,
            AppError::StateMismatch => StatusCode::BAD_REQUEST,
            AppError::NonceMismatch => StatusCode::BAD_REQUEST,
            AppError::InvalidCallback(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::TokenExchange(_) => StatusCode::BAD_GATEWAY,
            AppError::Graph(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Config(format!("Invalid URL: {}", err))
    }
}

impl From<tera::Error> for AppError {
    fn from(err: tera::Error) -> Self {
        AppError::Internal(format!("Template error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
