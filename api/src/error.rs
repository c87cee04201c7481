use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cache::CacheError;
use domain::ValidationError;
use job_queue::QueueError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("{0} already exists in portfolio")]
    AlreadyExists(String),
    #[error("market transport: {0}")]
    Transport(String),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        TrackerError::Transport(err.to_string())
    }
}

impl TrackerError {
    pub fn status(&self) -> StatusCode {
        match self {
            TrackerError::NotFound => StatusCode::NOT_FOUND,
            TrackerError::EditConflict | TrackerError::AlreadyExists(_) => StatusCode::CONFLICT,
            TrackerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TrackerError::Transport(_) => StatusCode::BAD_GATEWAY,
            TrackerError::Cache(_) | TrackerError::Queue(_) | TrackerError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            TrackerError::EditConflict => {
                "unable to update the record due to an edit conflict, please try again".to_string()
            }
            TrackerError::Cache(_) | TrackerError::Queue(_) | TrackerError::Database(_) => {
                tracing::error!(error = %self, "request failed");
                "the server encountered a problem and could not process your request".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
