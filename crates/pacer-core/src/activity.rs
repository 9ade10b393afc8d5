//! Activity log entries: the append-only facts that feed challenge
//! progress.
//!
//! An entry is immutable once accepted. Two idempotency keys are admissible:
//! `(challenge_id, user_id, client_event_id)` for entries typed in by the
//! user, and `(source, source_external_id)` for entries imported from a
//! health platform. At most one row exists per key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Rejection, Result};

/// Where an activity came from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActivitySource {
  Manual,
  Healthkit,
  Googlefit,
}

impl ActivitySource {
  /// Health-platform imports are keyed by the platform's own sample id.
  pub fn is_external(self) -> bool { !matches!(self, Self::Manual) }
}

// ─── ActivityLogEntry ────────────────────────────────────────────────────────

/// An accepted activity. Never updated or deleted by normal flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
  pub entry_id:           Uuid,
  pub challenge_id:       Uuid,
  pub user_id:            Uuid,
  pub activity_type:      String,
  pub value:              i64,
  pub unit:               String,
  /// When the activity happened, as reported by the client.
  pub recorded_at:        DateTime<Utc>,
  pub source:             ActivitySource,
  pub client_event_id:    Option<Uuid>,
  pub source_external_id: Option<String>,
  /// Server-assigned acceptance timestamp.
  pub created_at:         DateTime<Utc>,
}

// ─── NewActivity ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::ChallengeStore::log_activity`]. The caller's
/// identity is supplied separately by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActivity {
  pub challenge_id:       Uuid,
  pub activity_type:      String,
  pub value:              i64,
  pub unit:               String,
  pub recorded_at:        DateTime<Utc>,
  pub source:             ActivitySource,
  pub client_event_id:    Option<Uuid>,
  pub source_external_id: Option<String>,
}

/// The idempotency key an activity will be deduplicated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeKey<'a> {
  ClientEvent(Uuid),
  SourceExternal(ActivitySource, &'a str),
}

impl NewActivity {
  /// A manual entry keyed by a fresh client event id.
  pub fn manual(
    challenge_id: Uuid,
    activity_type: impl Into<String>,
    value: i64,
    unit: impl Into<String>,
    recorded_at: DateTime<Utc>,
  ) -> Self {
    Self {
      challenge_id,
      activity_type: activity_type.into(),
      value,
      unit: unit.into(),
      recorded_at,
      source: ActivitySource::Manual,
      client_event_id: Some(Uuid::new_v4()),
      source_external_id: None,
    }
  }

  /// Resolve the key this entry must be deduplicated on.
  ///
  /// Manual entries require `client_event_id`; imported entries require
  /// `source_external_id`. A missing key is fatal so that a broken retry loop
  /// cannot double-count.
  pub fn dedupe_key(&self) -> Result<DedupeKey<'_>> {
    if self.source.is_external() {
      self
        .external_id()
        .map(|s| DedupeKey::SourceExternal(self.source, s))
        .ok_or(Rejection::DedupeKeyRequired(self.source))
    } else {
      self
        .client_event_id
        .map(DedupeKey::ClientEvent)
        .ok_or(Rejection::DedupeKeyRequired(self.source))
    }
  }

  /// Every idempotency key this input carries, client event id first.
  ///
  /// An entry may carry both keys; a collision on either one identifies an
  /// earlier copy of it.
  pub fn supplied_keys(&self) -> Vec<DedupeKey<'_>> {
    let mut keys = Vec::with_capacity(2);
    if let Some(id) = self.client_event_id {
      keys.push(DedupeKey::ClientEvent(id));
    }
    if let Some(external_id) = self.external_id() {
      keys.push(DedupeKey::SourceExternal(self.source, external_id));
    }
    keys
  }

  /// `source_external_id`, with an empty string treated as absent.
  pub fn external_id(&self) -> Option<&str> {
    self.source_external_id.as_deref().filter(|s| !s.is_empty())
  }

  pub fn validate_value(&self) -> Result<()> {
    if self.value <= 0 {
      return Err(Rejection::InvalidValue(self.value));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(source: ActivitySource) -> NewActivity {
    NewActivity {
      challenge_id: Uuid::new_v4(),
      activity_type: "steps".into(),
      value: 100,
      unit: "steps".into(),
      recorded_at: Utc::now(),
      source,
      client_event_id: None,
      source_external_id: None,
    }
  }

  #[test]
  fn manual_requires_client_event_id() {
    let mut a = entry(ActivitySource::Manual);
    assert_eq!(
      a.dedupe_key(),
      Err(Rejection::DedupeKeyRequired(ActivitySource::Manual))
    );

    // An external id does not stand in for the manual key.
    a.source_external_id = Some("abc".into());
    assert!(a.dedupe_key().is_err());

    let id = Uuid::new_v4();
    a.client_event_id = Some(id);
    assert_eq!(a.dedupe_key(), Ok(DedupeKey::ClientEvent(id)));
  }

  #[test]
  fn imports_require_source_external_id() {
    let mut a = entry(ActivitySource::Healthkit);
    a.client_event_id = Some(Uuid::new_v4());
    assert_eq!(
      a.dedupe_key(),
      Err(Rejection::DedupeKeyRequired(ActivitySource::Healthkit))
    );

    a.source_external_id = Some(String::new());
    assert!(a.dedupe_key().is_err());

    a.source_external_id = Some("hk-sample-1".into());
    assert_eq!(
      a.dedupe_key(),
      Ok(DedupeKey::SourceExternal(ActivitySource::Healthkit, "hk-sample-1"))
    );
  }

  #[test]
  fn supplied_keys_lists_client_event_first() {
    let mut a = entry(ActivitySource::Manual);
    assert!(a.supplied_keys().is_empty());

    a.source_external_id = Some(String::new());
    assert!(a.supplied_keys().is_empty());

    let id = Uuid::new_v4();
    a.client_event_id = Some(id);
    a.source_external_id = Some("ext-1".into());
    assert_eq!(a.supplied_keys(), vec![
      DedupeKey::ClientEvent(id),
      DedupeKey::SourceExternal(ActivitySource::Manual, "ext-1"),
    ]);
  }

  #[test]
  fn value_must_be_positive() {
    let mut a = entry(ActivitySource::Manual);
    a.value = 0;
    assert_eq!(a.validate_value(), Err(Rejection::InvalidValue(0)));
    a.value = 1;
    assert!(a.validate_value().is_ok());
  }
}
