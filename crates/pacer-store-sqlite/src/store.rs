//! [`SqliteStore`]: the SQLite implementation of [`ChallengeStore`].

use std::{path::Path, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use pacer_core::{
  Rejection,
  activity::{ActivityLogEntry, DedupeKey, NewActivity},
  challenge::{
    Challenge, ChallengeParticipant, InviteStatus, NewChallenge, Standing,
    rank_standings,
  },
  clock::{Clock, SystemClock},
  lifecycle::{EffectiveStatus, StatusOverride},
  social::FriendRequest,
  store::{Applied, ChallengeStore},
  streak::{Profile, StreakView},
};

use crate::{
  Error, Result,
  encode::{
    RawChallenge, RawEntry, RawFriendRequest, RawParticipant, RawProfile,
    decode_uuid, encode_date, encode_dt, encode_enum, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Pacer challenge store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted. All calls
/// are serialised onto the connection's thread; concurrent ingestion of the
/// same idempotency key is resolved by the unique indexes.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, clock: Arc::new(SystemClock) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, clock: Arc::new(SystemClock) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the clock used for "now" in status and window checks.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  fn now(&self) -> DateTime<Utc> { self.clock.now() }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────
//
// Plain synchronous functions run on the connection thread, usually inside a
// transaction (`Transaction` derefs to `Connection`).

fn applied<T>(created: bool, value: T) -> Applied<T> {
  if created {
    Applied::Created(value)
  } else {
    Applied::AlreadyApplied(value)
  }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

fn select_profile(conn: &Connection, user_id: &str) -> Result<Option<Profile>> {
  conn
    .query_row(
      &format!("SELECT {} FROM profiles WHERE user_id = ?1", RawProfile::COLUMNS),
      rusqlite::params![user_id],
      RawProfile::from_row,
    )
    .optional()?
    .map(RawProfile::into_profile)
    .transpose()
}

fn require_profile(conn: &Connection, user_id: Uuid) -> Result<()> {
  let exists = conn
    .query_row(
      "SELECT 1 FROM profiles WHERE user_id = ?1",
      rusqlite::params![encode_uuid(user_id)],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if !exists {
    return Err(Rejection::ProfileNotFound(user_id).into());
  }
  Ok(())
}

fn select_challenge(
  conn: &Connection,
  challenge_id: &str,
) -> Result<Option<Challenge>> {
  conn
    .query_row(
      &format!(
        "SELECT {} FROM challenges WHERE challenge_id = ?1",
        RawChallenge::COLUMNS
      ),
      rusqlite::params![challenge_id],
      RawChallenge::from_row,
    )
    .optional()?
    .map(RawChallenge::into_challenge)
    .transpose()
}

fn select_participant(
  conn: &Connection,
  challenge_id: &str,
  user_id: &str,
) -> Result<Option<ChallengeParticipant>> {
  conn
    .query_row(
      &format!(
        "SELECT {} FROM challenge_participants
         WHERE challenge_id = ?1 AND user_id = ?2",
        RawParticipant::COLUMNS
      ),
      rusqlite::params![challenge_id, user_id],
      RawParticipant::from_row,
    )
    .optional()?
    .map(RawParticipant::into_participant)
    .transpose()
}

fn require_accepted(
  conn: &Connection,
  challenge_id: &str,
  user_id: &str,
) -> Result<ChallengeParticipant> {
  match select_participant(conn, challenge_id, user_id)? {
    Some(p) if p.invite_status == InviteStatus::Accepted => Ok(p),
    _ => Err(Rejection::NotParticipant.into()),
  }
}

fn select_entry_by_key(
  conn: &Connection,
  challenge_id: &str,
  user_id: &str,
  key: DedupeKey<'_>,
) -> Result<Option<ActivityLogEntry>> {
  let raw = match key {
    DedupeKey::ClientEvent(event_id) => conn
      .query_row(
        &format!(
          "SELECT {} FROM activity_logs
           WHERE challenge_id = ?1 AND user_id = ?2 AND client_event_id = ?3",
          RawEntry::COLUMNS
        ),
        rusqlite::params![challenge_id, user_id, encode_uuid(event_id)],
        RawEntry::from_row,
      )
      .optional()?,
    DedupeKey::SourceExternal(source, external_id) => conn
      .query_row(
        &format!(
          "SELECT {} FROM activity_logs
           WHERE source = ?1 AND source_external_id = ?2",
          RawEntry::COLUMNS
        ),
        rusqlite::params![encode_enum(&source), external_id],
        RawEntry::from_row,
      )
      .optional()?,
  };
  raw.map(RawEntry::into_entry).transpose()
}

fn insert_entry(
  conn: &Connection,
  entry: &ActivityLogEntry,
) -> rusqlite::Result<usize> {
  conn.execute(
    "INSERT INTO activity_logs (
       entry_id, challenge_id, user_id, activity_type, value, unit,
       recorded_at, source, client_event_id, source_external_id, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    rusqlite::params![
      encode_uuid(entry.entry_id),
      encode_uuid(entry.challenge_id),
      encode_uuid(entry.user_id),
      entry.activity_type,
      entry.value,
      entry.unit,
      encode_dt(entry.recorded_at),
      encode_enum(&entry.source),
      entry.client_event_id.map(encode_uuid),
      entry.source_external_id,
      encode_dt(entry.created_at),
    ],
  )
}

// ─── Activity ingestion ──────────────────────────────────────────────────────

/// The activity ingestion transaction.
///
/// Checks run in a fixed order and each short-circuits with a [`Rejection`]:
/// participation, effective status (fail-closed), `recorded_at` bounds, and
/// dedupe-key presence. A collision on any key the input carries resolves to
/// `AlreadyApplied` without touching any aggregate. Only a freshly inserted row increments the
/// participant's progress and advances the streak, all before commit.
fn ingest_activity(
  conn: &mut Connection,
  caller: Uuid,
  input: NewActivity,
  now: DateTime<Utc>,
) -> Result<Applied<ActivityLogEntry>> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let challenge_id = encode_uuid(input.challenge_id);
  let user_id = encode_uuid(caller);

  require_accepted(&tx, &challenge_id, &user_id)?;

  let challenge = select_challenge(&tx, &challenge_id)?;
  let status = challenge
    .as_ref()
    .map_or(EffectiveStatus::Forbidden, |c| c.effective_status(now));
  let challenge = match challenge {
    Some(c) if status.accepts_activity() => c,
    _ => return Err(Rejection::ChallengeNotActive(status).into()),
  };

  if !challenge.accepts_recorded_at(input.recorded_at, now) {
    return Err(Rejection::RecordedAtOutOfBounds(input.recorded_at).into());
  }

  input.dedupe_key()?;
  input.validate_value()?;

  let entry = ActivityLogEntry {
    entry_id:           Uuid::new_v4(),
    challenge_id:       input.challenge_id,
    user_id:            caller,
    activity_type:      input.activity_type.clone(),
    value:              input.value,
    unit:               input.unit.clone(),
    recorded_at:        input.recorded_at,
    source:             input.source,
    client_event_id:    input.client_event_id,
    source_external_id: input.external_id().map(str::to_owned),
    created_at:         now,
  };

  match insert_entry(&tx, &entry) {
    Ok(_) => {}
    Err(e) if is_unique_violation(&e) => {
      // Either supplied key may be the one that collided.
      let existing = input
        .supplied_keys()
        .into_iter()
        .map(|key| select_entry_by_key(&tx, &challenge_id, &user_id, key))
        .find_map(|found| found.transpose())
        .transpose()?
        .ok_or_else(|| {
          tracing::error!(
            challenge_id = %input.challenge_id,
            user_id = %caller,
            "unique violation on activity insert with no matching dedupe row"
          );
          Error::Sqlite(e)
        })?;
      tracing::info!(
        entry_id = %existing.entry_id,
        user_id = %caller,
        "duplicate activity ignored"
      );
      return Ok(Applied::AlreadyApplied(existing));
    }
    Err(e) => return Err(e.into()),
  }

  // Re-check acceptance in the same statement that moves the aggregate.
  let updated = tx.execute(
    "UPDATE challenge_participants
     SET current_progress = current_progress + ?1, updated_at = ?2
     WHERE challenge_id = ?3 AND user_id = ?4 AND invite_status = 'accepted'",
    rusqlite::params![entry.value, encode_dt(now), challenge_id, user_id],
  )?;
  if updated != 1 {
    return Err(Rejection::NotParticipant.into());
  }

  advance_streak(&tx, caller, entry.recorded_at.date_naive())?;

  tx.commit()?;

  tracing::debug!(
    entry_id = %entry.entry_id,
    challenge_id = %entry.challenge_id,
    user_id = %caller,
    value = entry.value,
    "activity accepted"
  );
  Ok(Applied::Created(entry))
}

/// Advance the user's streak for an accepted entry on calendar day `day`.
fn advance_streak(conn: &Connection, user_id: Uuid, day: NaiveDate) -> Result<()> {
  let id_str = encode_uuid(user_id);
  let Some(profile) = select_profile(conn, &id_str)? else {
    tracing::error!(user_id = %user_id, "profile row missing during activity ingestion");
    return Err(Error::Integrity(format!("no profile row for user {user_id}")));
  };

  if let Some(next) = profile.streak.advance(day) {
    conn.execute(
      "UPDATE profiles
       SET current_streak = ?1, longest_streak = ?2, last_activity_date = ?3
       WHERE user_id = ?4",
      rusqlite::params![
        next.current_streak,
        next.longest_streak,
        next.last_activity_date.map(encode_date),
        id_str,
      ],
    )?;
  }
  Ok(())
}

// ─── Membership ──────────────────────────────────────────────────────────────

fn invite_participant(
  conn: &mut Connection,
  caller: Uuid,
  challenge_id: Uuid,
  invitee: Uuid,
  now: DateTime<Utc>,
) -> Result<Applied<ChallengeParticipant>> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let challenge_str = encode_uuid(challenge_id);
  let invitee_str = encode_uuid(invitee);

  let challenge = select_challenge(&tx, &challenge_str)?
    .ok_or(Rejection::ChallengeNotFound(challenge_id))?;
  if challenge.created_by != caller {
    return Err(Rejection::NotCreator.into());
  }
  require_profile(&tx, invitee)?;

  let inserted = tx.execute(
    "INSERT INTO challenge_participants
       (challenge_id, user_id, invite_status, current_progress, updated_at)
     VALUES (?1, ?2, 'pending', 0, ?3)
     ON CONFLICT (challenge_id, user_id) DO NOTHING",
    rusqlite::params![challenge_str, invitee_str, encode_dt(now)],
  )?;
  let participant = select_participant(&tx, &challenge_str, &invitee_str)?
    .ok_or_else(|| Error::Integrity("participant vanished after insert".into()))?;
  tx.commit()?;

  Ok(applied(inserted == 1, participant))
}

fn accept_participant(
  conn: &mut Connection,
  caller: Uuid,
  challenge_id: Uuid,
  now: DateTime<Utc>,
) -> Result<Applied<ChallengeParticipant>> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let challenge_str = encode_uuid(challenge_id);
  let user_str = encode_uuid(caller);

  let participant = match select_participant(&tx, &challenge_str, &user_str)? {
    Some(p) if p.invite_status == InviteStatus::Accepted => {
      return Ok(Applied::AlreadyApplied(p));
    }
    Some(p) if p.invite_status == InviteStatus::Pending => p,
    _ => return Err(Rejection::NotInvited.into()),
  };

  let status = select_challenge(&tx, &challenge_str)?
    .map_or(EffectiveStatus::Forbidden, |c| c.effective_status(now));
  if !status.accepts_members() {
    return Err(Rejection::ChallengeNotActive(status).into());
  }

  tx.execute(
    "UPDATE challenge_participants
     SET invite_status = 'accepted', updated_at = ?1
     WHERE challenge_id = ?2 AND user_id = ?3 AND invite_status = 'pending'",
    rusqlite::params![encode_dt(now), challenge_str, user_str],
  )?;
  tx.commit()?;

  Ok(Applied::Created(ChallengeParticipant {
    invite_status: InviteStatus::Accepted,
    updated_at: now,
    ..participant
  }))
}

// ─── ChallengeStore impl ─────────────────────────────────────────────────────

impl ChallengeStore for SqliteStore {
  type Error = Error;

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn register_profile(&self, user_id: Uuid) -> Result<Applied<Profile>> {
    let id_str = encode_uuid(user_id);
    let at_str = encode_dt(self.now());

    self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT INTO profiles (user_id, created_at) VALUES (?1, ?2)
           ON CONFLICT (user_id) DO NOTHING",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(select_profile(conn, &id_str).and_then(|p| {
          p.map(|p| applied(inserted == 1, p))
            .ok_or_else(|| Error::Integrity("profile vanished after insert".into()))
        }))
      })
      .await?
  }

  async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
    let id_str = encode_uuid(user_id);
    self
      .conn
      .call(move |conn| Ok(select_profile(conn, &id_str)))
      .await?
  }

  async fn streak(&self, user_id: Uuid) -> Result<Option<StreakView>> {
    let today = self.now().date_naive();
    let profile = self.get_profile(user_id).await?;
    Ok(profile.map(|p| StreakView::new(&p, today)))
  }

  // ── Challenges ────────────────────────────────────────────────────────────

  async fn create_challenge(
    &self,
    caller: Uuid,
    input: NewChallenge,
  ) -> Result<Challenge> {
    input.validate()?;

    let challenge = Challenge {
      challenge_id:    Uuid::new_v4(),
      title:           input.title,
      created_by:      caller,
      start_date:      input.start_date,
      end_date:        input.end_date,
      status_override: None,
      created_at:      self.now(),
    };

    let id_str      = encode_uuid(challenge.challenge_id);
    let creator_str = encode_uuid(caller);
    let title       = challenge.title.clone();
    let start_str   = encode_dt(challenge.start_date);
    let end_str     = encode_dt(challenge.end_date);
    let at_str      = encode_dt(challenge.created_at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Err(e) = require_profile(&tx, caller) {
          return Ok(Err(e));
        }
        tx.execute(
          "INSERT INTO challenges
             (challenge_id, title, created_by, start_date, end_date, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, title, creator_str, start_str, end_str, at_str],
        )?;
        tx.execute(
          "INSERT INTO challenge_participants
             (challenge_id, user_id, invite_status, current_progress, updated_at)
           VALUES (?1, ?2, 'accepted', 0, ?3)",
          rusqlite::params![id_str, creator_str, at_str],
        )?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await??;

    tracing::info!(
      challenge_id = %challenge.challenge_id,
      created_by = %caller,
      "challenge created"
    );
    Ok(challenge)
  }

  async fn get_challenge(&self, challenge_id: Uuid) -> Result<Option<Challenge>> {
    let id_str = encode_uuid(challenge_id);
    self
      .conn
      .call(move |conn| Ok(select_challenge(conn, &id_str)))
      .await?
  }

  async fn set_status_override(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
    status: StatusOverride,
  ) -> Result<Challenge> {
    let id_str = encode_uuid(challenge_id);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let challenge = match select_challenge(&tx, &id_str) {
          Ok(Some(c)) => c,
          Ok(None) => return Ok(Err(Rejection::ChallengeNotFound(challenge_id).into())),
          Err(e) => return Ok(Err(e)),
        };
        if challenge.created_by != caller {
          return Ok(Err(Rejection::NotCreator.into()));
        }
        tx.execute(
          "UPDATE challenges SET status_override = ?1 WHERE challenge_id = ?2",
          rusqlite::params![encode_enum(&status), id_str],
        )?;
        tx.commit()?;
        Ok(Ok(Challenge { status_override: Some(status), ..challenge }))
      })
      .await?
  }

  async fn effective_status(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> Result<EffectiveStatus> {
    let now = self.now();
    let id_str = encode_uuid(challenge_id);
    let caller_str = encode_uuid(caller);

    self
      .conn
      .call(move |conn| {
        let status = select_challenge(conn, &id_str).and_then(|challenge| {
          let Some(challenge) = challenge else {
            return Ok(EffectiveStatus::Forbidden);
          };
          let visible = challenge.created_by == caller
            || select_participant(conn, &id_str, &caller_str)?.is_some();
          Ok(if visible {
            challenge.effective_status(now)
          } else {
            EffectiveStatus::Forbidden
          })
        });
        Ok(status)
      })
      .await?
  }

  // ── Membership ────────────────────────────────────────────────────────────

  async fn invite(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
    invitee: Uuid,
  ) -> Result<Applied<ChallengeParticipant>> {
    let now = self.now();
    self
      .conn
      .call(move |conn| Ok(invite_participant(conn, caller, challenge_id, invitee, now)))
      .await?
  }

  async fn accept_invite(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> Result<Applied<ChallengeParticipant>> {
    let now = self.now();
    let outcome = self
      .conn
      .call(move |conn| Ok(accept_participant(conn, caller, challenge_id, now)))
      .await??;
    if outcome.is_created() {
      tracing::info!(challenge_id = %challenge_id, user_id = %caller, "invite accepted");
    }
    Ok(outcome)
  }

  async fn decline_invite(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> Result<ChallengeParticipant> {
    let now = self.now();
    let challenge_str = encode_uuid(challenge_id);
    let user_str = encode_uuid(caller);

    self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE challenge_participants
           SET invite_status = 'declined', updated_at = ?1
           WHERE challenge_id = ?2 AND user_id = ?3 AND invite_status != 'declined'",
          rusqlite::params![encode_dt(now), challenge_str, user_str],
        )?;
        let participant = select_participant(conn, &challenge_str, &user_str);
        Ok(participant.and_then(|p| match p {
          Some(p) => {
            if updated == 1 {
              tracing::info!(challenge_id = %challenge_id, user_id = %caller, "invite declined");
            }
            Ok(p)
          }
          None => Err(Rejection::NotInvited.into()),
        }))
      })
      .await?
  }

  async fn get_participant(
    &self,
    challenge_id: Uuid,
    user_id: Uuid,
  ) -> Result<Option<ChallengeParticipant>> {
    let challenge_str = encode_uuid(challenge_id);
    let user_str = encode_uuid(user_id);
    self
      .conn
      .call(move |conn| Ok(select_participant(conn, &challenge_str, &user_str)))
      .await?
  }

  // ── Activity ──────────────────────────────────────────────────────────────

  async fn log_activity(
    &self,
    caller: Uuid,
    input: NewActivity,
  ) -> Result<Applied<ActivityLogEntry>> {
    let now = self.now();
    let challenge_id = input.challenge_id;

    let outcome = self
      .conn
      .call(move |conn| Ok(ingest_activity(conn, caller, input, now)))
      .await?;

    if let Err(Error::Rejected(rejection)) = &outcome {
      tracing::debug!(
        challenge_id = %challenge_id,
        user_id = %caller,
        kind = rejection.kind(),
        "activity rejected"
      );
    }
    outcome
  }

  async fn activity_history(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> Result<Vec<ActivityLogEntry>> {
    let challenge_str = encode_uuid(challenge_id);
    let user_str = encode_uuid(caller);

    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM activity_logs
           WHERE challenge_id = ?1 AND user_id = ?2
             AND recorded_at >= (SELECT start_date FROM challenges WHERE challenge_id = ?1)
             AND recorded_at <  (SELECT end_date   FROM challenges WHERE challenge_id = ?1)
           ORDER BY recorded_at, created_at",
          RawEntry::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![challenge_str, user_str], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }

  async fn leaderboard(
    &self,
    caller: Uuid,
    challenge_id: Uuid,
  ) -> Result<Vec<Standing>> {
    let challenge_str = encode_uuid(challenge_id);
    let caller_str = encode_uuid(caller);

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        match select_challenge(conn, &challenge_str) {
          Ok(Some(_)) => {}
          Ok(None) => return Ok(Err(Rejection::ChallengeNotFound(challenge_id).into())),
          Err(e) => return Ok(Err(e)),
        }
        if let Err(e) = require_accepted(conn, &challenge_str, &caller_str) {
          return Ok(Err(e));
        }
        let mut stmt = conn.prepare(
          "SELECT user_id, current_progress FROM challenge_participants
           WHERE challenge_id = ?1 AND invite_status = 'accepted'
           ORDER BY current_progress DESC, updated_at ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![challenge_str], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Ok(rows))
      })
      .await??;

    let sorted = rows
      .into_iter()
      .map(|(id, progress)| -> Result<(Uuid, i64)> {
        Ok((decode_uuid(&id)?, progress))
      })
      .collect::<Result<Vec<_>>>()?;
    Ok(rank_standings(sorted))
  }

  // ── Social ────────────────────────────────────────────────────────────────

  async fn send_friend_request(
    &self,
    caller: Uuid,
    to_user: Uuid,
  ) -> Result<Applied<FriendRequest>> {
    if caller == to_user {
      return Err(Rejection::SelfFriendRequest.into());
    }

    let request_id = encode_uuid(Uuid::new_v4());
    let from_str = encode_uuid(caller);
    let to_str = encode_uuid(to_user);
    let at_str = encode_dt(self.now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Err(e) = require_profile(&tx, to_user) {
          return Ok(Err(e));
        }
        let inserted = tx.execute(
          "INSERT INTO friend_requests (request_id, from_user, to_user, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (from_user, to_user) DO NOTHING",
          rusqlite::params![request_id, from_str, to_str, at_str],
        )?;
        let raw = tx
          .query_row(
            &format!(
              "SELECT {} FROM friend_requests WHERE from_user = ?1 AND to_user = ?2",
              RawFriendRequest::COLUMNS
            ),
            rusqlite::params![from_str, to_str],
            RawFriendRequest::from_row,
          )
          .optional()?;
        tx.commit()?;
        Ok(
          raw
            .ok_or_else(|| Error::Integrity("friend request vanished after insert".into()))
            .and_then(RawFriendRequest::into_request)
            .map(|r| applied(inserted == 1, r)),
        )
      })
      .await?
  }
}
