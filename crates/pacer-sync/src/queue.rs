//! The durable action queue.
//!
//! Actions are appended by [`ActionQueue::enqueue`], persisted before the
//! call returns, and replayed in insertion order by
//! [`ActionQueue::process_queue`]. Only one drain runs at a time; a call that
//! arrives while one is in flight returns a skipped report immediately.
//!
//! Per item outcome of one attempt:
//!
//! | Result | Effect |
//! |--------|--------|
//! | success or already applied | removed |
//! | permanent failure | removed, recorded as a dead letter |
//! | transient failure, retries left | `retry_count += 1`, `last_error` stored, stays in place |
//! | transient failure, retries exhausted | removed, recorded as a dead letter |
//! | deferred | untouched; the drain stops here |

use std::sync::{
  Mutex, MutexGuard, PoisonError,
  atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use pacer_core::activity::NewActivity;
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Result,
  action::{ActionPayload, QueuedAction},
  executor::{ActionExecutor, ExecError},
  observer::{Listeners, SubscriptionId},
  repository::QueueRepository,
};

/// Attempts an action gets before a transient failure becomes permanent.
pub const MAX_RETRIES: u32 = 5;

/// Stored error text is cut to this many characters.
pub const MAX_ERROR_CHARS: usize = 200;

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
  /// The server rejected the action.
  Rejected { kind: String },
  /// Every attempt failed transiently.
  RetriesExhausted,
}

/// An action the queue gave up on. Kept so the user can see what was lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAction {
  pub action:    QueuedAction,
  #[serde(flatten)]
  pub cause:     FailureCause,
  pub error:     String,
  pub failed_at: DateTime<Utc>,
}

/// Summary of one [`ActionQueue::process_queue`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
  pub processed: usize,
  pub succeeded: usize,
  pub failed:    usize,
  pub remaining: usize,
  /// Another drain was already running; nothing was attempted.
  pub skipped:   bool,
  /// The executor could not run actions yet; the drain stopped early.
  pub deferred:  Option<String>,
  pub failures:  Vec<FailedAction>,
}

// ─── Queue ───────────────────────────────────────────────────────────────────

/// Releases the single-flight flag when the drain ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| DrainGuard(flag))
  }
}

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

pub struct ActionQueue<R, E> {
  repo:     R,
  executor: E,
  items:    Mutex<Vec<QueuedAction>>,
  dead:     Mutex<Vec<FailedAction>>,
  draining: AtomicBool,
  failed:   Listeners<FailedAction>,
  applied:  Listeners<QueuedAction>,
}

impl<R, E> ActionQueue<R, E>
where
  R: QueueRepository,
  E: ActionExecutor,
{
  /// Restore any actions persisted by a previous process.
  pub fn new(repo: R, executor: E) -> Result<Self> {
    let items = repo.load()?;
    if !items.is_empty() {
      tracing::info!(pending = items.len(), "restored queued actions");
    }
    Ok(Self {
      repo,
      executor,
      items: Mutex::new(items),
      dead: Mutex::new(Vec::new()),
      draining: AtomicBool::new(false),
      failed: Listeners::new(),
      applied: Listeners::new(),
    })
  }

  pub fn repository(&self) -> &R { &self.repo }

  pub fn executor(&self) -> &E { &self.executor }

  // ── Enqueue ─────────────────────────────────────────────────────────────

  /// Append an action and persist the queue. Never touches the network.
  ///
  /// A persistence failure is logged; the action stays queued in memory and
  /// the next successful save writes it out.
  pub fn enqueue(&self, payload: ActionPayload) -> String {
    let action = QueuedAction::new(payload, Utc::now());
    let id = action.id.clone();
    let kind = action.kind();

    let mut items = self.lock_items();
    items.push(action);
    self.persist(&items);
    let pending = items.len();
    drop(items);

    tracing::debug!(action_id = %id, %kind, pending, "action enqueued");
    id
  }

  /// Queue a manual activity entry keyed by `client_event_id`.
  pub fn enqueue_log_activity(
    &self,
    challenge_id: Uuid,
    activity_type: impl Into<String>,
    value: i64,
    unit: impl Into<String>,
    recorded_at: DateTime<Utc>,
    client_event_id: Uuid,
  ) -> String {
    let mut activity =
      NewActivity::manual(challenge_id, activity_type, value, unit, recorded_at);
    activity.client_event_id = Some(client_event_id);
    self.enqueue(ActionPayload::LogActivity(activity))
  }

  // ── Drain ───────────────────────────────────────────────────────────────

  /// Attempt every queued action once, oldest first.
  pub async fn process_queue(&self) -> DrainReport {
    let Some(_guard) = DrainGuard::acquire(&self.draining) else {
      tracing::debug!("drain already in progress");
      return DrainReport {
        skipped: true,
        remaining: self.pending_count(),
        ..DrainReport::default()
      };
    };

    // Items enqueued from here on wait for the next drain.
    let snapshot = self.lock_items().clone();
    let mut report = DrainReport::default();

    for action in snapshot {
      let result = self.executor.execute(&action.payload).await;
      if let Err(ExecError::Deferred(reason)) = &result {
        // Later items would be deferred for the same reason.
        tracing::debug!(action_id = %action.id, %reason, "drain deferred");
        report.deferred = Some(reason.clone());
        break;
      }
      report.processed += 1;

      match result {
        Ok(outcome) => {
          self.remove(&action.id);
          report.succeeded += 1;
          tracing::debug!(
            action_id = %action.id,
            kind = %action.kind(),
            duplicate = !outcome.is_created(),
            "queued action applied"
          );
          self.applied.emit(&action);
        }
        Err(ExecError::Permanent { kind, message }) => {
          self.remove(&action.id);
          let failure = FailedAction {
            error: sanitize_error(&message),
            cause: FailureCause::Rejected { kind },
            action,
            failed_at: Utc::now(),
          };
          self.bury(&failure);
          report.failed += 1;
          report.failures.push(failure);
        }
        Err(ExecError::Transient(message)) => {
          let error = sanitize_error(&message);
          let attempts = action.retry_count + 1;
          if attempts < MAX_RETRIES {
            self.mark_retry(&action.id, attempts, &error);
            tracing::info!(
              action_id = %action.id,
              kind = %action.kind(),
              retry_count = attempts,
              error = %error,
              "queued action will be retried"
            );
          } else {
            self.remove(&action.id);
            let failure = FailedAction {
              cause: FailureCause::RetriesExhausted,
              error,
              action: QueuedAction {
                retry_count: attempts,
                ..action
              },
              failed_at: Utc::now(),
            };
            self.bury(&failure);
            report.failed += 1;
            report.failures.push(failure);
          }
        }
        Err(ExecError::Deferred(_)) => {}
      }
    }

    report.remaining = self.pending_count();
    tracing::info!(
      processed = report.processed,
      succeeded = report.succeeded,
      failed = report.failed,
      remaining = report.remaining,
      "queue drained"
    );
    report
  }

  pub fn is_draining(&self) -> bool { self.draining.load(Ordering::Acquire) }

  // ── Inspection ──────────────────────────────────────────────────────────

  pub fn pending(&self) -> Vec<QueuedAction> { self.lock_items().clone() }

  pub fn pending_count(&self) -> usize { self.lock_items().len() }

  /// Actions given up on since this queue was created.
  pub fn dead_letters(&self) -> Vec<FailedAction> {
    self.dead.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Drop every pending action. Returns how many were discarded.
  pub fn clear_queue(&self) -> usize {
    let mut items = self.lock_items();
    let dropped = items.len();
    items.clear();
    self.persist(&items);
    drop(items);
    tracing::warn!(dropped, "action queue cleared");
    dropped
  }

  // ── Observers ───────────────────────────────────────────────────────────

  pub fn on_failed(
    &self,
    callback: impl Fn(&FailedAction) + Send + Sync + 'static,
  ) -> SubscriptionId {
    self.failed.subscribe(callback)
  }

  pub fn on_applied(
    &self,
    callback: impl Fn(&QueuedAction) + Send + Sync + 'static,
  ) -> SubscriptionId {
    self.applied.subscribe(callback)
  }

  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    self.failed.unsubscribe(id) || self.applied.unsubscribe(id)
  }

  // ── Internals ───────────────────────────────────────────────────────────

  fn lock_items(&self) -> MutexGuard<'_, Vec<QueuedAction>> {
    self.items.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Callers hold the items lock so concurrent saves land in order.
  fn persist(&self, items: &[QueuedAction]) {
    if let Err(e) = self.repo.save(items) {
      tracing::warn!(error = %e, pending = items.len(), "failed to persist action queue");
    }
  }

  fn remove(&self, id: &str) {
    let mut items = self.lock_items();
    items.retain(|a| a.id != id);
    self.persist(&items);
  }

  fn mark_retry(&self, id: &str, retry_count: u32, error: &str) {
    let mut items = self.lock_items();
    // Cleared mid-drain: nothing to update.
    if let Some(item) = items.iter_mut().find(|a| a.id == id) {
      item.retry_count = retry_count;
      item.last_error = Some(error.to_owned());
      self.persist(&items);
    }
  }

  fn bury(&self, failure: &FailedAction) {
    tracing::warn!(
      action_id = %failure.action.id,
      kind = %failure.action.kind(),
      cause = ?failure.cause,
      error = %failure.error,
      "queued action failed permanently"
    );
    self
      .dead
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(failure.clone());
    self.failed.emit(failure);
  }
}

// ─── Error text ──────────────────────────────────────────────────────────────

const SECRET_KEYS: [&str; 5] = ["token", "secret", "password", "api_key", "apikey"];

/// Redact credentials from an error message and cap its length. Everything
/// else, whitespace included, is kept as is.
pub fn sanitize_error(message: &str) -> String {
  let mut out = String::with_capacity(message.len());
  let mut redact_next = false;

  for piece in message.split_inclusive(char::is_whitespace) {
    let word = piece.trim_end_matches(char::is_whitespace);
    let gap = &piece[word.len()..];
    if word.is_empty() {
      out.push_str(gap);
      continue;
    }
    if redact_next {
      out.push_str("[redacted]");
      redact_next = false;
    } else if word.eq_ignore_ascii_case("bearer") || word.eq_ignore_ascii_case("basic") {
      out.push_str(word);
      redact_next = true;
    } else {
      out.push_str(&redact_assignment(word));
    }
    out.push_str(gap);
  }

  truncate_chars(&out, MAX_ERROR_CHARS)
}

/// `token=abc` → `token=[redacted]`.
fn redact_assignment(word: &str) -> String {
  let Some((key, _)) = word.split_once(['=', ':']) else {
    return word.to_owned();
  };
  let lower = key.to_ascii_lowercase();
  if SECRET_KEYS.iter().any(|k| lower.ends_with(k)) {
    let sep = &word[key.len()..key.len() + 1];
    format!("{key}{sep}[redacted]")
  } else {
    word.to_owned()
  }
}

fn truncate_chars(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((idx, _)) => s[..idx].to_owned(),
    None => s.to_owned(),
  }
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashSet,
    sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
    },
  };

  use pacer_core::store::Applied;
  use tokio::sync::Notify;

  use super::*;
  use crate::repository::MemoryRepository;

  /// Fails the listed friend-request targets in the listed way; records the
  /// order of every attempt.
  #[derive(Default)]
  struct Scripted {
    calls:     Mutex<Vec<Uuid>>,
    transient: HashSet<Uuid>,
    permanent: HashSet<Uuid>,
    duplicate: HashSet<Uuid>,
  }

  impl Scripted {
    fn calls(&self) -> Vec<Uuid> { self.calls.lock().unwrap().clone() }
  }

  impl ActionExecutor for Scripted {
    async fn execute(
      &self,
      action: &ActionPayload,
    ) -> std::result::Result<Applied<()>, ExecError> {
      let ActionPayload::SendFriendRequest { to_user_id } = action else {
        return Ok(Applied::Created(()));
      };
      self.calls.lock().unwrap().push(*to_user_id);
      if self.transient.contains(to_user_id) {
        Err(ExecError::Transient("connection reset by peer".into()))
      } else if self.permanent.contains(to_user_id) {
        Err(ExecError::Permanent {
          kind:    "not_participant".into(),
          message: "caller is not an accepted participant".into(),
        })
      } else if self.duplicate.contains(to_user_id) {
        Ok(Applied::AlreadyApplied(()))
      } else {
        Ok(Applied::Created(()))
      }
    }
  }

  fn befriend(to_user_id: Uuid) -> ActionPayload {
    ActionPayload::SendFriendRequest { to_user_id }
  }

  fn queue(exec: Scripted) -> ActionQueue<MemoryRepository, Scripted> {
    ActionQueue::new(MemoryRepository::new(), exec).unwrap()
  }

  #[tokio::test]
  async fn fifo_with_retry_cap() {
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let q = queue(Scripted {
      transient: HashSet::from([b]),
      ..Scripted::default()
    });
    q.enqueue(befriend(a));
    q.enqueue(befriend(b));
    q.enqueue(befriend(c));

    let first = q.process_queue().await;
    assert_eq!(q.executor().calls(), vec![a, b, c]);
    assert_eq!((first.processed, first.succeeded, first.failed), (3, 2, 0));
    assert_eq!(first.remaining, 1);
    let pending = q.pending();
    assert_eq!(pending[0].retry_count, 1);
    assert_eq!(pending[0].last_error.as_deref(), Some("connection reset by peer"));

    for pass in 2..MAX_RETRIES {
      let report = q.process_queue().await;
      assert_eq!(report.failed, 0, "pass {pass}");
      assert_eq!(report.remaining, 1);
    }

    let last = q.process_queue().await;
    assert_eq!(last.failed, 1);
    assert_eq!(last.remaining, 0);
    assert_eq!(last.failures[0].cause, FailureCause::RetriesExhausted);
    assert_eq!(last.failures[0].action.retry_count, MAX_RETRIES);

    let calls = q.executor().calls();
    assert_eq!(calls.iter().filter(|id| **id == b).count(), MAX_RETRIES as usize);
    assert_eq!(calls.iter().filter(|id| **id == a).count(), 1);
    assert_eq!(q.dead_letters().len(), 1);
  }

  #[tokio::test]
  async fn permanent_failure_is_dropped_at_once() {
    let bad = Uuid::new_v4();
    let q = queue(Scripted {
      permanent: HashSet::from([bad]),
      ..Scripted::default()
    });
    let failures = Arc::new(AtomicUsize::new(0));
    let f = failures.clone();
    q.on_failed(move |_| {
      f.fetch_add(1, Ordering::SeqCst);
    });

    q.enqueue(befriend(bad));
    let report = q.process_queue().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(
      report.failures[0].cause,
      FailureCause::Rejected { kind: "not_participant".into() }
    );
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(q.repository().snapshot().is_empty());
  }

  #[tokio::test]
  async fn already_applied_counts_as_success() {
    let dup = Uuid::new_v4();
    let q = queue(Scripted {
      duplicate: HashSet::from([dup]),
      ..Scripted::default()
    });
    let applied = Arc::new(AtomicUsize::new(0));
    let a = applied.clone();
    q.on_applied(move |_| {
      a.fetch_add(1, Ordering::SeqCst);
    });

    q.enqueue(befriend(dup));
    let report = q.process_queue().await;
    assert_eq!((report.succeeded, report.failed, report.remaining), (1, 0, 0));
    assert_eq!(applied.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn enqueue_persists_and_survives_restart() {
    let q = queue(Scripted::default());
    let id = q.enqueue_log_activity(
      Uuid::new_v4(),
      "steps",
      1000,
      "steps",
      Utc::now(),
      Uuid::new_v4(),
    );

    let saved = q.repository().snapshot();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, id);

    let restored =
      ActionQueue::new(MemoryRepository::with_items(saved), Scripted::default())
        .unwrap();
    assert_eq!(restored.pending_count(), 1);
  }

  #[tokio::test]
  async fn clear_drops_everything() {
    let q = queue(Scripted::default());
    q.enqueue(befriend(Uuid::new_v4()));
    q.enqueue(befriend(Uuid::new_v4()));
    assert_eq!(q.clear_queue(), 2);
    assert_eq!(q.pending_count(), 0);
    assert!(q.repository().snapshot().is_empty());
  }

  /// Blocks inside `execute` until released.
  struct Gate {
    entered: Notify,
    release: Notify,
  }

  impl ActionExecutor for Arc<Gate> {
    async fn execute(
      &self,
      _action: &ActionPayload,
    ) -> std::result::Result<Applied<()>, ExecError> {
      self.entered.notify_one();
      self.release.notified().await;
      Ok(Applied::Created(()))
    }
  }

  #[tokio::test]
  async fn concurrent_drain_is_a_no_op() {
    let gate = Arc::new(Gate { entered: Notify::new(), release: Notify::new() });
    let q = Arc::new(ActionQueue::new(MemoryRepository::new(), gate.clone()).unwrap());
    q.enqueue(befriend(Uuid::new_v4()));

    let running = tokio::spawn({
      let q = q.clone();
      async move { q.process_queue().await }
    });
    gate.entered.notified().await;
    assert!(q.is_draining());

    // Enqueued mid-drain: left for the next pass.
    q.enqueue(befriend(Uuid::new_v4()));
    let second = q.process_queue().await;
    assert!(second.skipped);
    assert_eq!(second.processed, 0);

    gate.release.notify_one();
    let first = running.await.unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.remaining, 1);
    assert!(!q.is_draining());
  }

  /// Defers every action until `signed_in` is set.
  #[derive(Default)]
  struct SignedOut {
    signed_in: AtomicBool,
    attempts:  AtomicUsize,
  }

  impl ActionExecutor for Arc<SignedOut> {
    async fn execute(
      &self,
      _action: &ActionPayload,
    ) -> std::result::Result<Applied<()>, ExecError> {
      if !self.signed_in.load(Ordering::SeqCst) {
        return Err(ExecError::Deferred("no active session".into()));
      }
      self.attempts.fetch_add(1, Ordering::SeqCst);
      Ok(Applied::Created(()))
    }
  }

  #[tokio::test]
  async fn deferred_drains_keep_retry_budget() {
    let exec = Arc::new(SignedOut::default());
    let q = ActionQueue::new(MemoryRepository::new(), exec.clone()).unwrap();
    q.enqueue(befriend(Uuid::new_v4()));
    q.enqueue(befriend(Uuid::new_v4()));

    for _ in 0..MAX_RETRIES * 2 {
      let report = q.process_queue().await;
      assert_eq!(report.deferred.as_deref(), Some("no active session"));
      assert_eq!((report.processed, report.failed, report.remaining), (0, 0, 2));
    }
    assert!(q.pending().iter().all(|a| a.retry_count == 0 && a.last_error.is_none()));
    assert!(q.dead_letters().is_empty());

    exec.signed_in.store(true, Ordering::SeqCst);
    let report = q.process_queue().await;
    assert_eq!(report.deferred, None);
    assert_eq!((report.processed, report.succeeded, report.remaining), (2, 2, 0));
    assert_eq!(exec.attempts.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn error_text_keeps_spacing() {
    let msg = "upstream said:\n  502\tBad Gateway  (retry later)";
    assert_eq!(sanitize_error(msg), msg);
    assert_eq!(
      sanitize_error("Authorization:  Bearer\tabc.def  end"),
      "Authorization:  Bearer\t[redacted]  end"
    );
  }

  #[test]
  fn error_text_is_scrubbed_and_capped() {
    let msg = "401 from server: Authorization: Bearer eyJhbGciOi token=abc123 ok";
    let clean = sanitize_error(msg);
    assert!(!clean.contains("eyJhbGciOi"));
    assert!(!clean.contains("abc123"));
    assert!(clean.contains("token=[redacted]"));
    assert!(clean.ends_with("ok"));

    let long = "é".repeat(500);
    assert_eq!(sanitize_error(&long).chars().count(), MAX_ERROR_CHARS);
  }
}
