//! Handlers for activity endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/activity` | Body: [`NewActivity`]; 201 when accepted, 200 when already applied |
//! | `GET`  | `/challenges/:id/activity` | Caller's entries inside the challenge window |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  response::Response,
};
use pacer_core::{
  activity::{ActivityLogEntry, NewActivity},
  store::ChallengeStore,
};
use uuid::Uuid;

use crate::{Caller, applied_response, error::ApiError};

/// `POST /activity`: runs the ingestion transaction for the caller.
pub async fn log<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Json(body): Json<NewActivity>,
) -> Result<Response, ApiError>
where
  S: ChallengeStore,
{
  let outcome = store
    .log_activity(caller, body)
    .await
    .map_err(ApiError::from_store)?;
  Ok(applied_response(outcome))
}

/// `GET /challenges/:id/activity`
pub async fn history<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<ActivityLogEntry>>, ApiError>
where
  S: ChallengeStore,
{
  let entries = store
    .activity_history(caller, id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(entries))
}
