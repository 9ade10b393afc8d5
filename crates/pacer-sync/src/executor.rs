//! The seam between the queue and whatever transport reaches the server.

use std::future::Future;

use pacer_core::store::Applied;
use thiserror::Error;
use uuid::Uuid;

use crate::action::ActionPayload;

/// How an execution attempt failed, from the queue's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
  /// The server refused the action for a reason retrying cannot fix.
  #[error("rejected ({kind}): {message}")]
  Permanent { kind: String, message: String },

  /// Network trouble, timeouts, or unexpected server failures.
  #[error("{0}")]
  Transient(String),

  /// Nothing can run yet, e.g. no signed-in user. The action was not sent
  /// and keeps its retry budget.
  #[error("deferred: {0}")]
  Deferred(String),
}

impl ExecError {
  pub fn is_permanent(&self) -> bool { matches!(self, Self::Permanent { .. }) }
}

/// Runs one queued action against the server.
///
/// Implementations must resolve the caller's identity when `execute` is
/// called, never when the action was enqueued, and return
/// [`ExecError::Deferred`] when there is none. `AlreadyApplied` counts as
/// success.
pub trait ActionExecutor: Send + Sync + 'static {
  fn execute(
    &self,
    action: &ActionPayload,
  ) -> impl Future<Output = Result<Applied<()>, ExecError>> + Send;
}

/// Supplies the currently authenticated user, if any.
pub trait SessionProvider: Send + Sync + 'static {
  fn current_user(&self) -> Option<Uuid>;
}
