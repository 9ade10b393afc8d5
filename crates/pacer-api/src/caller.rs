//! Caller identity extractor.
//!
//! Authentication happens upstream: the session gateway in front of this
//! router verifies the user's credentials and forwards their id in the
//! [`USER_HEADER`] header. Handlers take a [`Caller`] argument and pass its id
//! straight to the store.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the authenticated user's id.
pub const USER_HEADER: &str = "x-pacer-user";

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Uuid);

impl<S> FromRequestParts<S> for Caller
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    let raw = parts
      .headers
      .get(USER_HEADER)
      .and_then(|v| v.to_str().ok())
      .ok_or(ApiError::Unauthenticated)?;
    let id = Uuid::parse_str(raw.trim()).map_err(|_| ApiError::Unauthenticated)?;
    Ok(Caller(id))
  }
}
