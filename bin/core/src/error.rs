use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{docker::EngineError, job::SubmitError};

/// Classified failures surfaced by the API. Every kind maps to the
/// status code carried in the response envelope.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("{0}")]
  InvalidInput(String),
  #[error("unauthorized request")]
  Unauthorized,
  #[error("{0} not found")]
  NotFound(String),
  #[error("{0}")]
  Conflict(String),
  #[error("container engine unavailable | {0}")]
  EngineUnavailable(String),
  #[error("store unavailable | {0}")]
  StoreUnavailable(String),
  #[error("job queue full")]
  QueueFull,
  #[error("job engine stopped")]
  EngineStopped,
  #[error(transparent)]
  Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  pub fn status_code(&self) -> StatusCode {
    match self {
      Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
      Error::Unauthorized => StatusCode::UNAUTHORIZED,
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::Conflict(_) => StatusCode::CONFLICT,
      Error::EngineUnavailable(_)
      | Error::StoreUnavailable(_)
      | Error::QueueFull
      | Error::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
      Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<store::StoreError> for Error {
  fn from(e: store::StoreError) -> Error {
    match e {
      store::StoreError::NotFound => {
        Error::NotFound(String::from("record"))
      }
      store::StoreError::Corrupt(e) => {
        Error::Internal(anyhow::Error::new(e))
      }
      store::StoreError::Unavailable(e) => {
        Error::StoreUnavailable(e.to_string())
      }
    }
  }
}

impl From<EngineError> for Error {
  fn from(e: EngineError) -> Error {
    match e {
      EngineError::Unavailable(e) => Error::EngineUnavailable(e),
      EngineError::NotFound(subject) => {
        Error::NotFound(format!("container {subject}"))
      }
      EngineError::NameConflict(message) => {
        Error::Conflict(message)
      }
      EngineError::InvalidSpec(message) => {
        Error::InvalidInput(message)
      }
      e @ EngineError::Timeout(_) => {
        Error::EngineUnavailable(e.to_string())
      }
    }
  }
}

impl From<SubmitError> for Error {
  fn from(e: SubmitError) -> Error {
    match e {
      SubmitError::QueueFull => Error::QueueFull,
      SubmitError::Stopped => Error::EngineStopped,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let code = self.status_code();
    if code == StatusCode::INTERNAL_SERVER_ERROR {
      error!("internal error | {self:#}");
    }
    let body = Json(json!({
      "success": false,
      "code": code.as_u16(),
      "data": { "error": self.to_string() },
    }));
    let mut response = (code, body).into_response();
    if let Error::QueueFull = self {
      response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    }
    response
  }
}
