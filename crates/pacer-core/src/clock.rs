//! Wall-clock abstraction so time-window rules can be tested
//! deterministically.

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};

/// A source of "now".
pub trait Clock: Send + Sync + 'static {
  fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock frozen at a caller-chosen instant. Intended for tests.
#[derive(Debug)]
pub struct FixedClock {
  now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
  pub fn new(now: DateTime<Utc>) -> Self { Self { now: Mutex::new(now) } }

  pub fn set(&self, now: DateTime<Utc>) {
    *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
  }

  pub fn advance(&self, by: TimeDelta) {
    let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *guard += by;
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(|e| e.into_inner())
  }
}
