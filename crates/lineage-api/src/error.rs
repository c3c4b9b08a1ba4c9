//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use lineage_core::{DomainError, Error as CoreError};
use serde_json::json;
use thiserror::Error;

/// What a user is told when their write lost a race.
pub const CONFLICT_MESSAGE: &str =
  "your change conflicts with a more recent update — reload and retry";

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The stream moved on since the caller read it.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by the domain condition behind it.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + DomainError + Send + Sync + 'static,
  {
    let Some(core) = err.as_core() else {
      return Self::Store(Box::new(err));
    };
    match core {
      CoreError::ConcurrencyConflict { .. } => Self::Conflict(core.to_string()),
      e if e.is_not_found() => Self::NotFound(e.to_string()),
      CoreError::InvalidChange { .. }
      | CoreError::InvalidQuery(_)
      | CoreError::StreamTypeMismatch { .. }
      | CoreError::UnknownStreamType(_)
      | CoreError::UnknownEventType(_) => Self::BadRequest(core.to_string()),
      _ => Self::Store(Box::new(err)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => {
        (StatusCode::BAD_REQUEST, json!({ "error": m }))
      }
      ApiError::Conflict(m) => (
        StatusCode::CONFLICT,
        json!({ "error": CONFLICT_MESSAGE, "detail": m }),
      ),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store error");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
      }
    };
    (status, Json(body)).into_response()
  }
}
