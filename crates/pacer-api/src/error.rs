//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use pacer_core::{Rejection, RejectionSource};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("missing or malformed caller identity")]
  Unauthenticated,

  /// A domain rejection from the store. Never worth retrying.
  #[error(transparent)]
  Rejected(Rejection),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a store error: rejections keep their kind, everything else is
  /// an opaque server failure.
  pub fn from_store<E>(e: E) -> Self
  where
    E: std::error::Error + RejectionSource + Send + Sync + 'static,
  {
    match e.rejection() {
      Some(r) => ApiError::Rejected(r.clone()),
      None => ApiError::Store(Box::new(e)),
    }
  }

  /// Stable machine-readable code sent as `kind` in the response body.
  pub fn kind(&self) -> &'static str {
    match self {
      ApiError::NotFound(_) => "not_found",
      ApiError::BadRequest(_) => "bad_request",
      ApiError::Unauthenticated => "unauthenticated",
      ApiError::Rejected(r) => r.kind(),
      ApiError::Store(_) => "internal",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
      ApiError::Rejected(r) => rejection_status(r),
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

fn rejection_status(r: &Rejection) -> StatusCode {
  match r {
    Rejection::NotParticipant | Rejection::NotCreator | Rejection::NotInvited => {
      StatusCode::FORBIDDEN
    }
    Rejection::ChallengeNotFound(_) | Rejection::ProfileNotFound(_) => {
      StatusCode::NOT_FOUND
    }
    Rejection::ChallengeNotActive(_)
    | Rejection::RecordedAtOutOfBounds(_)
    | Rejection::DedupeKeyRequired(_)
    | Rejection::InvalidValue(_)
    | Rejection::InvalidWindow
    | Rejection::SelfFriendRequest => StatusCode::UNPROCESSABLE_ENTITY,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if let ApiError::Store(e) = &self {
      tracing::error!(error = %e, "store failure");
    }
    let body = json!({ "error": self.to_string(), "kind": self.kind() });
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use pacer_core::{activity::ActivitySource, lifecycle::EffectiveStatus};

  use super::*;

  #[test]
  fn rejections_map_to_client_errors() {
    let cases = [
      (Rejection::NotParticipant, StatusCode::FORBIDDEN),
      (Rejection::NotCreator, StatusCode::FORBIDDEN),
      (
        Rejection::ChallengeNotFound(uuid::Uuid::nil()),
        StatusCode::NOT_FOUND,
      ),
      (
        Rejection::ChallengeNotActive(EffectiveStatus::Completed),
        StatusCode::UNPROCESSABLE_ENTITY,
      ),
      (
        Rejection::RecordedAtOutOfBounds(Utc::now()),
        StatusCode::UNPROCESSABLE_ENTITY,
      ),
      (
        Rejection::DedupeKeyRequired(ActivitySource::Healthkit),
        StatusCode::UNPROCESSABLE_ENTITY,
      ),
    ];
    for (rejection, status) in cases {
      let err = ApiError::Rejected(rejection);
      assert_eq!(err.status(), status, "{err}");
      assert!(err.status().is_client_error());
    }
  }

  #[test]
  fn store_failure_is_internal() {
    let err = ApiError::Store("disk on fire".into());
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.kind(), "internal");
  }
}
