//! `POST /friend-requests`: body `{"to_user_id":"..."}`; idempotent per pair.

use std::sync::Arc;

use axum::{Json, extract::State, response::Response};
use pacer_core::store::ChallengeStore;
use serde::Deserialize;
use uuid::Uuid;

use crate::{Caller, applied_response, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct FriendRequestBody {
  pub to_user_id: Uuid,
}

pub async fn send_request<S>(
  State(store): State<Arc<S>>,
  Caller(caller): Caller,
  Json(body): Json<FriendRequestBody>,
) -> Result<Response, ApiError>
where
  S: ChallengeStore,
{
  let outcome = store
    .send_friend_request(caller, body.to_user_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(applied_response(outcome))
}
