//! Handlers for `/profiles` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/profiles` | Registers the caller; idempotent |
//! | `GET`  | `/profiles/me/streak` | Caller's streak with the decayed display value |

use std::sync::Arc;

use axum::{Json, extract::State, response::Response};
use pacer_core::{store::ChallengeStore, streak::StreakView};

use crate::{Caller, applied_response, error::ApiError};

/// `POST /profiles`: create the caller's profile if it does not exist.
pub async fn register<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
) -> Result<Response, ApiError>
where
  S: ChallengeStore,
{
  let outcome = store
    .register_profile(caller)
    .await
    .map_err(ApiError::from_store)?;
  Ok(applied_response(outcome))
}

/// `GET /profiles/me/streak`
pub async fn streak<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
) -> Result<Json<StreakView>, ApiError>
where
  S: ChallengeStore,
{
  let view = store
    .streak(caller)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("profile {caller} not found")))?;
  Ok(Json(view))
}
