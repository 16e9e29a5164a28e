use tokio::task::JoinError;
use exif::Error as ExifError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Catalog store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("EXIF error: {0}")]
    Exif(#[from] ExifError),

    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Tokio join error: {0}")]
    Join(#[from] JoinError),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Channel send error")]
    SendError,

    #[error("Generic error: {0}")]
    Generic(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({
                "error": self.to_string(),
            }))
    }

    fn status_code(&self) -> StatusCode {
        match *self {
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // A malformed MATCH expression surfaces as a SQLite error.
            AppError::Sqlite(_) => StatusCode::BAD_REQUEST,
            AppError::Walkdir(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Glob(_) => StatusCode::BAD_REQUEST,
            AppError::Image(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Exif(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::Url(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Classifier(_) => StatusCode::BAD_GATEWAY,
            AppError::SendError => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Generic(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for AppError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        AppError::SendError
    }
}
