use std::path::PathBuf;
use thiserror::Error;

#[cfg(feature = "web")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Failures while building the credential store at startup.
///
/// Any of these aborts the process before the server binds.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credential entry on line {line}: expected `username,password`")]
    MalformedLine { line: usize },
}

/// Errors raised while serving a request or bootstrapping the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("data file has no header row")]
    EmptyData,

    #[error("line {line}: expected {expected} fields, saw {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("column `{0}` not found")]
    UnknownColumn(String),

    #[error("column `{0}` is not numeric")]
    NonNumericColumn(String),

    #[error("plot rendering failed: {0}")]
    Plot(String),

    #[error("missing form field `{0}`")]
    MissingField(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[cfg(feature = "web")]
    #[error("multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[cfg(feature = "web")]
    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[cfg(feature = "web")]
    #[error("template registration error: {0}")]
    TemplateSetup(#[from] handlebars::TemplateError),
}

#[cfg(feature = "web")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::MissingField(_) | AppError::Multipart(_) => {
                log::warn!("rejected malformed request: {}", self);
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            _ => {
                log::error!("request failed: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
