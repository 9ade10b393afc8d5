//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings, calendar dates as
//! `YYYY-MM-DD`, enums as their snake_case names, and UUIDs as hyphenated
//! lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use pacer_core::{
  activity::ActivityLogEntry,
  challenge::{Challenge, ChallengeParticipant},
  social::FriendRequest,
  streak::{Profile, Streak},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ────────────────────────────────────────────────────────────────────

pub fn encode_enum<T: AsRef<str>>(v: &T) -> String { v.as_ref().to_owned() }

/// Parse a snake_case enum column via its `FromStr` impl.
pub fn decode_enum<T: FromStr>(what: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `profiles` row.
pub struct RawProfile {
  pub user_id:            String,
  pub current_streak:     u32,
  pub longest_streak:     u32,
  pub last_activity_date: Option<String>,
  pub created_at:         String,
}

impl RawProfile {
  pub const COLUMNS: &'static str =
    "user_id, current_streak, longest_streak, last_activity_date, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:            row.get(0)?,
      current_streak:     row.get(1)?,
      longest_streak:     row.get(2)?,
      last_activity_date: row.get(3)?,
      created_at:         row.get(4)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      user_id:    decode_uuid(&self.user_id)?,
      streak:     Streak {
        current_streak:     self.current_streak,
        longest_streak:     self.longest_streak,
        last_activity_date: self
          .last_activity_date
          .as_deref()
          .map(decode_date)
          .transpose()?,
      },
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `challenges` row.
pub struct RawChallenge {
  pub challenge_id:    String,
  pub title:           String,
  pub created_by:      String,
  pub start_date:      String,
  pub end_date:        String,
  pub status_override: Option<String>,
  pub created_at:      String,
}

impl RawChallenge {
  pub const COLUMNS: &'static str = "challenge_id, title, created_by, \
                                     start_date, end_date, status_override, \
                                     created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      challenge_id:    row.get(0)?,
      title:           row.get(1)?,
      created_by:      row.get(2)?,
      start_date:      row.get(3)?,
      end_date:        row.get(4)?,
      status_override: row.get(5)?,
      created_at:      row.get(6)?,
    })
  }

  pub fn into_challenge(self) -> Result<Challenge> {
    Ok(Challenge {
      challenge_id:    decode_uuid(&self.challenge_id)?,
      title:           self.title,
      created_by:      decode_uuid(&self.created_by)?,
      start_date:      decode_dt(&self.start_date)?,
      end_date:        decode_dt(&self.end_date)?,
      status_override: self
        .status_override
        .as_deref()
        .map(|s| decode_enum("status override", s))
        .transpose()?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `challenge_participants` row.
pub struct RawParticipant {
  pub challenge_id:     String,
  pub user_id:          String,
  pub invite_status:    String,
  pub current_progress: i64,
  pub updated_at:       String,
}

impl RawParticipant {
  pub const COLUMNS: &'static str =
    "challenge_id, user_id, invite_status, current_progress, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      challenge_id:     row.get(0)?,
      user_id:          row.get(1)?,
      invite_status:    row.get(2)?,
      current_progress: row.get(3)?,
      updated_at:       row.get(4)?,
    })
  }

  pub fn into_participant(self) -> Result<ChallengeParticipant> {
    Ok(ChallengeParticipant {
      challenge_id:     decode_uuid(&self.challenge_id)?,
      user_id:          decode_uuid(&self.user_id)?,
      invite_status:    decode_enum("invite status", &self.invite_status)?,
      current_progress: self.current_progress,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from an `activity_logs` row.
pub struct RawEntry {
  pub entry_id:           String,
  pub challenge_id:       String,
  pub user_id:            String,
  pub activity_type:      String,
  pub value:              i64,
  pub unit:               String,
  pub recorded_at:        String,
  pub source:             String,
  pub client_event_id:    Option<String>,
  pub source_external_id: Option<String>,
  pub created_at:         String,
}

impl RawEntry {
  pub const COLUMNS: &'static str = "entry_id, challenge_id, user_id, \
                                     activity_type, value, unit, recorded_at, \
                                     source, client_event_id, \
                                     source_external_id, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:           row.get(0)?,
      challenge_id:       row.get(1)?,
      user_id:            row.get(2)?,
      activity_type:      row.get(3)?,
      value:              row.get(4)?,
      unit:               row.get(5)?,
      recorded_at:        row.get(6)?,
      source:             row.get(7)?,
      client_event_id:    row.get(8)?,
      source_external_id: row.get(9)?,
      created_at:         row.get(10)?,
    })
  }

  pub fn into_entry(self) -> Result<ActivityLogEntry> {
    Ok(ActivityLogEntry {
      entry_id:           decode_uuid(&self.entry_id)?,
      challenge_id:       decode_uuid(&self.challenge_id)?,
      user_id:            decode_uuid(&self.user_id)?,
      activity_type:      self.activity_type,
      value:              self.value,
      unit:               self.unit,
      recorded_at:        decode_dt(&self.recorded_at)?,
      source:             decode_enum("activity source", &self.source)?,
      client_event_id:    self
        .client_event_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      source_external_id: self.source_external_id,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `friend_requests` row.
pub struct RawFriendRequest {
  pub request_id: String,
  pub from_user:  String,
  pub to_user:    String,
  pub created_at: String,
}

impl RawFriendRequest {
  pub const COLUMNS: &'static str = "request_id, from_user, to_user, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      request_id: row.get(0)?,
      from_user:  row.get(1)?,
      to_user:    row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_request(self) -> Result<FriendRequest> {
    Ok(FriendRequest {
      request_id: decode_uuid(&self.request_id)?,
      from_user:  decode_uuid(&self.from_user)?,
      to_user:    decode_uuid(&self.to_user)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
