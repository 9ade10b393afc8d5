//! Per-user consecutive-day activity streaks.
//!
//! The stored streak only ever moves forward in response to accepted
//! activity. Decay to zero after a missed day is a presentation concern,
//! computed on read by [`Streak::displayed`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The streak fields of a user's profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
  pub current_streak:     u32,
  pub longest_streak:     u32,
  /// UTC calendar date of the entry that last advanced the streak.
  pub last_activity_date: Option<NaiveDate>,
}

impl Streak {
  /// Apply an accepted activity on calendar day `day`.
  ///
  /// Returns `None` when the streak is unaffected: a second entry on the same
  /// day, or a backdated entry, must neither inflate nor rewind it.
  pub fn advance(&self, day: NaiveDate) -> Option<Self> {
    let current = match self.last_activity_date {
      Some(last) if day <= last => return None,
      Some(last) if last.succ_opt() == Some(day) => self.current_streak + 1,
      _ => 1,
    };
    Some(Self {
      current_streak:     current,
      longest_streak:     self.longest_streak.max(current),
      last_activity_date: Some(day),
    })
  }

  /// The streak as shown to users on `today`: zero once a full day has been
  /// missed since the last activity.
  pub fn displayed(&self, today: NaiveDate) -> u32 {
    match self.last_activity_date {
      Some(last) if today <= last || last.succ_opt() == Some(today) => {
        self.current_streak
      }
      _ => 0,
    }
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// The streak-bearing part of a user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub user_id:    Uuid,
  #[serde(flatten)]
  pub streak:     Streak,
  pub created_at: DateTime<Utc>,
}

/// Read model returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakView {
  pub user_id:            Uuid,
  pub current_streak:     u32,
  pub longest_streak:     u32,
  pub last_activity_date: Option<NaiveDate>,
  pub displayed_streak:   u32,
}

impl StreakView {
  pub fn new(profile: &Profile, today: NaiveDate) -> Self {
    Self {
      user_id:            profile.user_id,
      current_streak:     profile.streak.current_streak,
      longest_streak:     profile.streak.longest_streak,
      last_activity_date: profile.streak.last_activity_date,
      displayed_streak:   profile.streak.displayed(today),
    }
  }
}
