//! The `ChallengeStore` trait and the `Applied` outcome type.
//!
//! The trait is implemented by storage backends (e.g. `pacer-store-sqlite`).
//! Higher layers (`pacer-api`) depend on this abstraction, not on any
//! concrete backend.
//!
//! Every method that acts on behalf of a user takes the caller's id as its
//! first argument. The store trusts it; establishing identity is the job of
//! the session layer in front of the store.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  RejectionSource,
  activity::{ActivityLogEntry, NewActivity},
  challenge::{Challenge, ChallengeParticipant, NewChallenge, Standing},
  lifecycle::{EffectiveStatus, StatusOverride},
  social::FriendRequest,
  streak::{Profile, StreakView},
};

// ─── Applied ─────────────────────────────────────────────────────────────────

/// The result of an idempotent write.
///
/// `AlreadyApplied` means an earlier call with the same idempotency key
/// already took effect; callers must treat it exactly like `Created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum Applied<T> {
  Created(T),
  AlreadyApplied(T),
}

impl<T> Applied<T> {
  pub fn is_created(&self) -> bool { matches!(self, Self::Created(_)) }

  pub fn inner(&self) -> &T {
    match self {
      Self::Created(t) | Self::AlreadyApplied(t) => t,
    }
  }

  pub fn into_inner(self) -> T {
    match self {
      Self::Created(t) | Self::AlreadyApplied(t) => t,
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Pacer challenge store backend.
///
/// `log_activity` is the only path that creates activity entries and the
/// only path that moves a participant's `current_progress` or a profile's
/// streak. Backends must run it as one atomic unit.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ChallengeStore: Send + Sync {
  type Error: std::error::Error + RejectionSource + Send + Sync + 'static;

  // ── Profiles ──────────────────────────────────────────────────────────

  /// Create the profile row for `user_id`. Idempotent.
  fn register_profile(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Applied<Profile>, Self::Error>> + Send + '_;

  fn get_profile(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  /// The user's streak as of the store's current day, including the
  /// decayed display value. `None` if the profile does not exist.
  fn streak(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<StreakView>, Self::Error>> + Send + '_;

  // ── Challenges ────────────────────────────────────────────────────────

  /// Create a challenge; the creator joins it as an accepted participant.
  fn create_challenge(
    &self,
    caller: Uuid,
    input: NewChallenge,
  ) -> impl Future<Output = Result<Challenge, Self::Error>> + Send + '_;

  fn get_challenge(
    &self,
    challenge_id: Uuid,
  ) -> impl Future<Output = Result<Option<Challenge>, Self::Error>> + Send + '_;

  /// Cancel or archive a challenge. Creator only.
  fn set_status_override(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
    status: StatusOverride,
  ) -> impl Future<Output = Result<Challenge, Self::Error>> + Send + '_;

  /// The challenge's phase right now, or `Forbidden` if the caller cannot
  /// see it. Read-only.
  fn effective_status(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> impl Future<Output = Result<EffectiveStatus, Self::Error>> + Send + '_;

  // ── Membership ────────────────────────────────────────────────────────

  /// Invite `invitee` to a challenge. Creator only; idempotent.
  fn invite(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
    invitee: Uuid,
  ) -> impl Future<Output = Result<Applied<ChallengeParticipant>, Self::Error>>
  + Send
  + '_;

  /// Accept a pending invitation. Accepting twice is `AlreadyApplied`.
  fn accept_invite(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> impl Future<Output = Result<Applied<ChallengeParticipant>, Self::Error>>
  + Send
  + '_;

  fn decline_invite(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> impl Future<Output = Result<ChallengeParticipant, Self::Error>> + Send + '_;

  fn get_participant(
    &self,
    challenge_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<ChallengeParticipant>, Self::Error>>
  + Send
  + '_;

  // ── Activity ──────────────────────────────────────────────────────────

  /// Accept an activity for `caller`, updating their progress and streak in
  /// the same unit of work. A repeated idempotency key is `AlreadyApplied`
  /// and leaves all aggregates untouched.
  fn log_activity(
    &self,
    caller: Uuid,
    input: NewActivity,
  ) -> impl Future<Output = Result<Applied<ActivityLogEntry>, Self::Error>>
  + Send
  + '_;

  /// The caller's entries inside the challenge window, oldest first.
  fn activity_history(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ActivityLogEntry>, Self::Error>> + Send + '_;

  /// Accepted participants ordered by descending progress.
  fn leaderboard(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Standing>, Self::Error>> + Send + '_;

  // ── Social ────────────────────────────────────────────────────────────

  /// Send a friend request. Idempotent per `(caller, to_user)`.
  fn send_friend_request(
    &self,
    caller: Uuid,
    to_user: Uuid,
  ) -> impl Future<Output = Result<Applied<FriendRequest>, Self::Error>> + Send + '_;
}
