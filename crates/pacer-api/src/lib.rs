//! JSON REST API for Pacer.
//!
//! Exposes an axum [`Router`] backed by any [`pacer_core::store::ChallengeStore`].
//! Authentication, TLS, and transport concerns are the caller's
//! responsibility; see [`caller`] for how identity reaches the handlers.
//!
//! Idempotent writes answer `201 Created` the first time and `200 OK` with
//! `"outcome": "already_applied"` on every repeat, so clients can treat both
//! as success.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", pacer_api::api_router(store.clone()))
//! ```

pub mod activity;
pub mod caller;
pub mod challenges;
pub mod error;
pub mod profiles;
pub mod social;

use std::sync::Arc;

use axum::{
  Json, Router,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use pacer_core::store::{Applied, ChallengeStore};
use serde::Serialize;

pub use caller::{Caller, USER_HEADER};
pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: ChallengeStore + Send + Sync + 'static,
{
  Router::new()
    // Profiles
    .route("/profiles", post(profiles::register::<S>))
    .route("/profiles/me/streak", get(profiles::streak::<S>))
    // Challenges
    .route("/challenges", post(challenges::create::<S>))
    .route("/challenges/{id}", get(challenges::get_one::<S>))
    .route("/challenges/{id}/status", get(challenges::status::<S>))
    .route("/challenges/{id}/leaderboard", get(challenges::leaderboard::<S>))
    .route("/challenges/{id}/activity", get(activity::history::<S>))
    .route("/challenges/{id}/override", post(challenges::set_override::<S>))
    .route("/challenges/{id}/invites", post(challenges::invite::<S>))
    .route("/challenges/{id}/accept", post(challenges::accept::<S>))
    .route("/challenges/{id}/decline", post(challenges::decline::<S>))
    // Activity
    .route("/activity", post(activity::log::<S>))
    // Social
    .route("/friend-requests", post(social::send_request::<S>))
    .with_state(store)
}

/// `201` for a fresh write, `200` for a repeat; the body carries the outcome.
pub(crate) fn applied_response<T: Serialize>(outcome: Applied<T>) -> Response {
  let status = if outcome.is_created() {
    StatusCode::CREATED
  } else {
    StatusCode::OK
  };
  (status, Json(outcome)).into_response()
}

#[cfg(test)]
mod tests;
