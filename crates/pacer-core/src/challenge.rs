//! Challenges and their participants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Rejection, Result,
  lifecycle::{self, EffectiveStatus, StatusOverride},
};

// ─── Challenge ───────────────────────────────────────────────────────────────

/// A time-boxed competition. `start_date < end_date` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
  pub challenge_id:    Uuid,
  pub title:           String,
  pub created_by:      Uuid,
  pub start_date:      DateTime<Utc>,
  pub end_date:        DateTime<Utc>,
  pub status_override: Option<StatusOverride>,
  pub created_at:      DateTime<Utc>,
}

impl Challenge {
  pub fn effective_status(&self, now: DateTime<Utc>) -> EffectiveStatus {
    lifecycle::effective_status(
      now,
      self.start_date,
      self.end_date,
      self.status_override,
    )
  }

  pub fn contains(&self, t: DateTime<Utc>) -> bool {
    lifecycle::within_window(self.start_date, self.end_date, t)
  }

  pub fn accepts_recorded_at(
    &self,
    recorded_at: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> bool {
    lifecycle::recorded_at_in_bounds(
      self.start_date,
      self.end_date,
      recorded_at,
      now,
    )
  }
}

/// Input to [`crate::store::ChallengeStore::create_challenge`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChallenge {
  pub title:      String,
  pub start_date: DateTime<Utc>,
  pub end_date:   DateTime<Utc>,
}

impl NewChallenge {
  pub fn validate(&self) -> Result<()> {
    if self.start_date >= self.end_date {
      return Err(Rejection::InvalidWindow);
    }
    Ok(())
  }
}

// ─── Participants ────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InviteStatus {
  Pending,
  Accepted,
  Declined,
}

/// A user's membership in a challenge.
///
/// `current_progress` is the running sum of the participant's accepted
/// activity values. It is maintained incrementally by the ingestion
/// transaction and is never recomputed by summing on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeParticipant {
  pub challenge_id:     Uuid,
  pub user_id:          Uuid,
  pub invite_status:    InviteStatus,
  pub current_progress: i64,
  pub updated_at:       DateTime<Utc>,
}

/// One row of a challenge leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
  /// 1-based position; ties share the rank of the first tied row.
  pub rank:             u32,
  pub user_id:          Uuid,
  pub current_progress: i64,
}

/// Assign ranks to participants already sorted by descending progress.
pub fn rank_standings(sorted: Vec<(Uuid, i64)>) -> Vec<Standing> {
  let mut out: Vec<Standing> = Vec::with_capacity(sorted.len());
  for (idx, (user_id, current_progress)) in sorted.into_iter().enumerate() {
    let rank = match out.last() {
      Some(prev) if prev.current_progress == current_progress => prev.rank,
      _ => idx as u32 + 1,
    };
    out.push(Standing { rank, user_id, current_progress });
  }
  out
}
