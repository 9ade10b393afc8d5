//! Where the CLI gets the caller's identity from.
//!
//! Both providers are consulted when a request is sent, not when an action
//! is queued, so `pacer login` after a long offline stretch applies to
//! everything still waiting in the queue.

use std::{
  fs,
  io::ErrorKind,
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use pacer_sync::SessionProvider;
use uuid::Uuid;

/// A fixed user, from `--user` / `PACER_USER`.
pub struct StaticSession(pub Uuid);

impl SessionProvider for StaticSession {
  fn current_user(&self) -> Option<Uuid> { Some(self.0) }
}

/// The user id stored in the session file by `pacer login`.
pub struct FileSession {
  path: PathBuf,
}

impl FileSession {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }

  pub fn store(&self, user: Uuid) -> Result<()> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)
        .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&self.path, format!("{user}\n"))
      .with_context(|| format!("writing session file {}", self.path.display()))
  }

  pub fn clear(&self) -> Result<()> {
    match fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e)
        .with_context(|| format!("removing session file {}", self.path.display())),
    }
  }
}

impl SessionProvider for FileSession {
  fn current_user(&self) -> Option<Uuid> {
    let raw = fs::read_to_string(&self.path).ok()?;
    match Uuid::parse_str(raw.trim()) {
      Ok(id) => Some(id),
      Err(e) => {
        tracing::warn!(path = %self.path.display(), error = %e, "ignoring malformed session file");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_session_is_read_on_every_call() {
    let path = std::env::temp_dir()
      .join(format!("pacer-session-{}", Uuid::new_v4()));
    let session = FileSession::new(&path);
    assert_eq!(session.current_user(), None);

    let alice = Uuid::new_v4();
    session.store(alice).unwrap();
    assert_eq!(session.current_user(), Some(alice));

    let bob = Uuid::new_v4();
    session.store(bob).unwrap();
    assert_eq!(session.current_user(), Some(bob));

    session.clear().unwrap();
    assert_eq!(session.current_user(), None);
    session.clear().unwrap();
  }
}
