//! Rejections: the closed set of permanent, non-retryable failures.

use thiserror::Error;
use uuid::Uuid;

use crate::{activity::ActivitySource, lifecycle::EffectiveStatus};

/// A write was refused for a reason that retrying can never fix.
///
/// Clients discard the triggering queued action immediately instead of
/// spending retry budget on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
  #[error("caller is not an accepted participant of this challenge")]
  NotParticipant,

  #[error("challenge is not accepting activity (status: {0})")]
  ChallengeNotActive(EffectiveStatus),

  #[error("recorded_at {0} is outside the challenge window")]
  RecordedAtOutOfBounds(chrono::DateTime<chrono::Utc>),

  #[error("activity from source {0} requires a dedupe key")]
  DedupeKeyRequired(ActivitySource),

  #[error("activity value must be positive, got {0}")]
  InvalidValue(i64),

  #[error("challenge not found: {0}")]
  ChallengeNotFound(Uuid),

  #[error("challenge start must be strictly before its end")]
  InvalidWindow,

  #[error("caller has no pending invitation to this challenge")]
  NotInvited,

  #[error("only the challenge creator may do this")]
  NotCreator,

  #[error("cannot send a friend request to yourself")]
  SelfFriendRequest,

  #[error("profile not found: {0}")]
  ProfileNotFound(Uuid),
}

impl Rejection {
  /// Stable machine-readable code, used on the wire.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::NotParticipant => "not_participant",
      Self::ChallengeNotActive(_) => "challenge_not_active",
      Self::RecordedAtOutOfBounds(_) => "recorded_at_out_of_bounds",
      Self::DedupeKeyRequired(_) => "dedupe_key_required",
      Self::InvalidValue(_) => "invalid_value",
      Self::ChallengeNotFound(_) => "challenge_not_found",
      Self::InvalidWindow => "invalid_window",
      Self::NotInvited => "not_invited",
      Self::NotCreator => "not_creator",
      Self::SelfFriendRequest => "self_friend_request",
      Self::ProfileNotFound(_) => "profile_not_found",
    }
  }
}

/// Implemented by backend error types so generic layers can tell a
/// [`Rejection`] apart from an infrastructure failure.
pub trait RejectionSource {
  fn rejection(&self) -> Option<&Rejection>;
}

impl RejectionSource for Rejection {
  fn rejection(&self) -> Option<&Rejection> { Some(self) }
}

pub type Result<T, E = Rejection> = std::result::Result<T, E>;
