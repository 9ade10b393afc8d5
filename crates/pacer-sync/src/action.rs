//! Queued actions: the closed set of idempotent mutations a client may
//! buffer while offline.

use chrono::{DateTime, Utc};
use pacer_core::activity::NewActivity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a queued action does, with the data it needs.
///
/// Each variant carries (or is keyed by) an idempotency key the server
/// deduplicates on, so executing the same payload twice is safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ActionPayload {
  /// Keyed by `client_event_id` or `source_external_id`.
  LogActivity(NewActivity),
  /// Keyed by `(challenge_id, caller)`.
  AcceptInvite { challenge_id: Uuid },
  /// Keyed by `(caller, to_user_id)`.
  SendFriendRequest { to_user_id: Uuid },
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  strum::Display,
  strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
  LogActivity,
  AcceptInvite,
  SendFriendRequest,
}

impl ActionPayload {
  pub fn kind(&self) -> ActionKind {
    match self {
      ActionPayload::LogActivity(_) => ActionKind::LogActivity,
      ActionPayload::AcceptInvite { .. } => ActionKind::AcceptInvite,
      ActionPayload::SendFriendRequest { .. } => ActionKind::SendFriendRequest,
    }
  }

  /// The challenge this action touches, if any.
  pub fn challenge_id(&self) -> Option<Uuid> {
    match self {
      ActionPayload::LogActivity(a) => Some(a.challenge_id),
      ActionPayload::AcceptInvite { challenge_id } => Some(*challenge_id),
      ActionPayload::SendFriendRequest { .. } => None,
    }
  }
}

/// A pending mutation, persisted until it succeeds or fails for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
  pub id:          String,
  #[serde(flatten)]
  pub payload:     ActionPayload,
  pub created_at:  DateTime<Utc>,
  pub retry_count: u32,
  /// Last transient failure, scrubbed and truncated.
  pub last_error:  Option<String>,
}

impl QueuedAction {
  pub fn new(payload: ActionPayload, created_at: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      payload,
      created_at,
      retry_count: 0,
      last_error: None,
    }
  }

  pub fn kind(&self) -> ActionKind { self.payload.kind() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn serialises_with_kind_and_payload() {
    let challenge_id = Uuid::nil();
    let action = QueuedAction::new(
      ActionPayload::AcceptInvite { challenge_id },
      Utc::now(),
    );
    let json = serde_json::to_value(&action).unwrap();
    assert_eq!(json["kind"], "accept_invite");
    assert_eq!(json["payload"]["challenge_id"], challenge_id.to_string());
    assert_eq!(json["retry_count"], 0);

    let back: QueuedAction = serde_json::from_value(json).unwrap();
    assert_eq!(back, action);
  }

  #[test]
  fn kind_names_are_snake_case() {
    assert_eq!(ActionKind::SendFriendRequest.to_string(), "send_friend_request");
  }
}
