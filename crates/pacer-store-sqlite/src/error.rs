//! Error type for `pacer-store-sqlite`.

use pacer_core::{Rejection, RejectionSource};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A permanent domain rejection; the transaction was rolled back.
  #[error(transparent)]
  Rejected(#[from] Rejection),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("decode error: {0}")]
  Decode(String),

  /// Derived state is inconsistent with the rows it is derived from.
  #[error("data integrity violation: {0}")]
  Integrity(String),
}

impl RejectionSource for Error {
  fn rejection(&self) -> Option<&Rejection> {
    match self {
      Error::Rejected(r) => Some(r),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
