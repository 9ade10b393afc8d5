//! Friend requests. Only the idempotent "send" step is modelled here; the
//! rest of the friendship workflow lives elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request from one user to another. At most one exists per ordered pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
  pub request_id: Uuid,
  pub from_user:  Uuid,
  pub to_user:    Uuid,
  pub created_at: DateTime<Utc>,
}
