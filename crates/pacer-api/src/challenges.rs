//! Handlers for `/challenges` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/challenges` | Body: [`NewChallenge`]; returns 201 + challenge |
//! | `GET`  | `/challenges/:id` | Challenge plus its effective status |
//! | `GET`  | `/challenges/:id/status` | Effective status only; `forbidden` if not visible |
//! | `GET`  | `/challenges/:id/leaderboard` | Accepted participants by progress |
//! | `POST` | `/challenges/:id/override` | Body: `{"status":"cancelled"}`; creator only |
//! | `POST` | `/challenges/:id/invites` | Body: `{"user_id":"..."}`; creator only, idempotent |
//! | `POST` | `/challenges/:id/accept` | Accept the caller's invitation; idempotent |
//! | `POST` | `/challenges/:id/decline` | Decline or leave |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use pacer_core::{
  challenge::{Challenge, ChallengeParticipant, NewChallenge, Standing},
  lifecycle::{EffectiveStatus, StatusOverride},
  store::ChallengeStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Caller, applied_response, error::ApiError};

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /challenges`: the caller becomes creator and first participant.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Json(body): Json<NewChallenge>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChallengeStore,
{
  let challenge = store
    .create_challenge(caller, body)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(challenge)))
}

// ─── Read ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeView {
  #[serde(flatten)]
  pub challenge: Challenge,
  pub status:    EffectiveStatus,
}

/// `GET /challenges/:id`: 404 unless the caller can see the challenge.
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<ChallengeView>, ApiError>
where
  S: ChallengeStore,
{
  let status = store
    .effective_status(caller, id)
    .await
    .map_err(ApiError::from_store)?;
  if status == EffectiveStatus::Forbidden {
    return Err(ApiError::NotFound(format!("challenge {id} not found")));
  }
  let challenge = store
    .get_challenge(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("challenge {id} not found")))?;
  Ok(Json(ChallengeView { challenge, status }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusBody {
  pub challenge_id: Uuid,
  pub status:       EffectiveStatus,
}

/// `GET /challenges/:id/status`: always 200; `forbidden` is a value, not an
/// error.
pub async fn status<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<StatusBody>, ApiError>
where
  S: ChallengeStore,
{
  let status = store
    .effective_status(caller, id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(StatusBody { challenge_id: id, status }))
}

/// `GET /challenges/:id/leaderboard`
pub async fn leaderboard<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Standing>>, ApiError>
where
  S: ChallengeStore,
{
  let standings = store
    .leaderboard(caller, id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(standings))
}

// ─── Override ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OverrideBody {
  pub status: StatusOverride,
}

/// `POST /challenges/:id/override`
pub async fn set_override<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<OverrideBody>,
) -> Result<Json<Challenge>, ApiError>
where
  S: ChallengeStore,
{
  let challenge = store
    .set_status_override(caller, id, body.status)
    .await
    .map_err(ApiError::from_store)?;
  tracing::info!(challenge_id = %id, status = %body.status, "status override set");
  Ok(Json(challenge))
}

// ─── Membership ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InviteBody {
  pub user_id: Uuid,
}

/// `POST /challenges/:id/invites`
pub async fn invite<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<InviteBody>,
) -> Result<Response, ApiError>
where
  S: ChallengeStore,
{
  let outcome = store
    .invite(caller, id, body.user_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(applied_response(outcome))
}

/// `POST /challenges/:id/accept`
pub async fn accept<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Response, ApiError>
where
  S: ChallengeStore,
{
  let outcome = store
    .accept_invite(caller, id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(applied_response(outcome))
}

/// `POST /challenges/:id/decline`
pub async fn decline<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<ChallengeParticipant>, ApiError>
where
  S: ChallengeStore,
{
  let participant = store
    .decline_invite(caller, id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(participant))
}
