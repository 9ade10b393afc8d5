//! Durable storage for the action queue.
//!
//! The queue is always read and written as a whole value, so any storage
//! that can replace a blob atomically will do.

use std::{
  fs,
  io::ErrorKind,
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use crate::{Error, Result, action::QueuedAction};

pub trait QueueRepository: Send + Sync + 'static {
  fn load(&self) -> Result<Vec<QueuedAction>>;
  fn save(&self, items: &[QueuedAction]) -> Result<()>;
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// Keeps the last saved snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
  items: Mutex<Vec<QueuedAction>>,
}

impl MemoryRepository {
  pub fn new() -> Self { Self::default() }

  pub fn with_items(items: Vec<QueuedAction>) -> Self {
    Self { items: Mutex::new(items) }
  }

  pub fn snapshot(&self) -> Vec<QueuedAction> {
    self.items.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

impl QueueRepository for MemoryRepository {
  fn load(&self) -> Result<Vec<QueuedAction>> { Ok(self.snapshot()) }

  fn save(&self, items: &[QueuedAction]) -> Result<()> {
    *self.items.lock().unwrap_or_else(PoisonError::into_inner) = items.to_vec();
    Ok(())
  }
}

// ─── JSON file ───────────────────────────────────────────────────────────────

/// A JSON array on disk, replaced via write-to-temp-then-rename.
#[derive(Debug, Clone)]
pub struct FileRepository {
  path: PathBuf,
}

impl FileRepository {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }

  fn io_err(&self, source: std::io::Error) -> Error {
    Error::Io { path: self.path.clone(), source }
  }
}

impl QueueRepository for FileRepository {
  fn load(&self) -> Result<Vec<QueuedAction>> {
    match fs::read(&self.path) {
      Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
      Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
      Err(e) => Err(self.io_err(e)),
    }
  }

  fn save(&self, items: &[QueuedAction]) -> Result<()> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
    }
    let json = serde_json::to_vec_pretty(items)?;
    let tmp = self.path.with_extension("tmp");
    fs::write(&tmp, json).map_err(|e| self.io_err(e))?;
    fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::action::ActionPayload;

  #[test]
  fn file_round_trip_and_missing_file() {
    let path = std::env::temp_dir()
      .join(format!("pacer-queue-{}", Uuid::new_v4()))
      .join("queue.json");
    let repo = FileRepository::new(&path);

    assert!(repo.load().unwrap().is_empty());

    let items = vec![QueuedAction::new(
      ActionPayload::SendFriendRequest { to_user_id: Uuid::new_v4() },
      Utc::now(),
    )];
    repo.save(&items).unwrap();
    assert_eq!(repo.load().unwrap(), items);
    assert!(!path.with_extension("tmp").exists());

    repo.save(&[]).unwrap();
    assert!(repo.load().unwrap().is_empty());

    if let Some(dir) = path.parent() {
      let _ = fs::remove_dir_all(dir);
    }
  }
}
