//! Challenge lifecycle status, computed at query time.
//!
//! Challenges never store their phase. The phase is derived from the
//! challenge's time bounds and an optional administrative override, and this
//! module is the only place that derivation happens. The ingestion path and
//! every display surface call [`effective_status`]; nothing else does its own
//! date math.
//!
//! The active window is the half-open interval `[start, end)`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// How far past "now" a `recorded_at` may lie before it is rejected.
/// Covers device clock drift only; it is not a backfill allowance.
pub const CLOCK_SKEW_GRACE_SECS: i64 = 5 * 60;

// ─── Override ────────────────────────────────────────────────────────────────

/// An administrative status that trumps the time-derived phase.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusOverride {
  Cancelled,
  Archived,
}

// ─── Computed status ─────────────────────────────────────────────────────────

/// The lifecycle phase of a challenge as of some instant.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EffectiveStatus {
  Upcoming,
  Active,
  Completed,
  Cancelled,
  Archived,
  /// The challenge could not be looked up for this caller. Never equivalent
  /// to `Completed` or `Active`.
  Forbidden,
}

impl EffectiveStatus {
  /// Only an active challenge accepts activity.
  pub fn accepts_activity(self) -> bool { matches!(self, Self::Active) }

  /// Invitations may be accepted until the challenge ends.
  pub fn accepts_members(self) -> bool {
    matches!(self, Self::Upcoming | Self::Active)
  }
}

impl From<StatusOverride> for EffectiveStatus {
  fn from(o: StatusOverride) -> Self {
    match o {
      StatusOverride::Cancelled => Self::Cancelled,
      StatusOverride::Archived => Self::Archived,
    }
  }
}

/// Derive a challenge's phase. An override wins over the clock.
pub fn effective_status(
  now: DateTime<Utc>,
  start: DateTime<Utc>,
  end: DateTime<Utc>,
  status_override: Option<StatusOverride>,
) -> EffectiveStatus {
  if let Some(o) = status_override {
    return o.into();
  }
  if now < start {
    EffectiveStatus::Upcoming
  } else if now >= end {
    EffectiveStatus::Completed
  } else {
    EffectiveStatus::Active
  }
}

/// `start <= t < end`.
pub fn within_window(
  start: DateTime<Utc>,
  end: DateTime<Utc>,
  t: DateTime<Utc>,
) -> bool {
  start <= t && t < end
}

/// Whether an activity timestamp may be accepted: inside the window, and not
/// further in the future than the clock-skew grace.
pub fn recorded_at_in_bounds(
  start: DateTime<Utc>,
  end: DateTime<Utc>,
  recorded_at: DateTime<Utc>,
  now: DateTime<Utc>,
) -> bool {
  within_window(start, end, recorded_at)
    && recorded_at <= now + TimeDelta::seconds(CLOCK_SKEW_GRACE_SECS)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
  }

  #[test]
  fn phases_follow_half_open_window() {
    let (start, end) = (at(1, 0), at(31, 0));
    assert_eq!(effective_status(at(1, 0) - TimeDelta::seconds(1), start, end, None), EffectiveStatus::Upcoming);
    assert_eq!(effective_status(start, start, end, None), EffectiveStatus::Active);
    assert_eq!(effective_status(at(15, 12), start, end, None), EffectiveStatus::Active);
    assert_eq!(effective_status(end, start, end, None), EffectiveStatus::Completed);
  }

  #[test]
  fn override_beats_the_clock() {
    let (start, end) = (at(1, 0), at(31, 0));
    assert_eq!(
      effective_status(at(10, 0), start, end, Some(StatusOverride::Cancelled)),
      EffectiveStatus::Cancelled
    );
    assert_eq!(
      effective_status(at(1, 0) - TimeDelta::days(3), start, end, Some(StatusOverride::Archived)),
      EffectiveStatus::Archived
    );
  }

  #[test]
  fn bounds_match_status_window() {
    let (start, end) = (at(1, 0), at(31, 0));
    let now = at(31, 0) + TimeDelta::days(1);
    assert!(recorded_at_in_bounds(start, end, start, now));
    assert!(!recorded_at_in_bounds(start, end, end, now));
    assert!(!recorded_at_in_bounds(start, end, start - TimeDelta::seconds(1), now));
  }

  #[test]
  fn bounds_allow_only_small_future_drift() {
    let (start, end) = (at(1, 0), at(31, 0));
    let now = at(10, 0);
    assert!(recorded_at_in_bounds(start, end, now + TimeDelta::minutes(5), now));
    assert!(!recorded_at_in_bounds(
      start,
      end,
      now + TimeDelta::minutes(5) + TimeDelta::seconds(1),
      now
    ));
  }

  #[test]
  fn status_strings_are_snake_case() {
    assert_eq!(EffectiveStatus::Forbidden.as_ref(), "forbidden");
    assert_eq!("archived".parse::<StatusOverride>().unwrap(), StatusOverride::Archived);
    assert_eq!(
      serde_json::to_string(&EffectiveStatus::Upcoming).unwrap(),
      "\"upcoming\""
    );
  }
}
