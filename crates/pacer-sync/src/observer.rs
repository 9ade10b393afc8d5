//! A small subscribe/unsubscribe registry.
//!
//! Callbacks are held by `Arc` and dropped on unsubscribe. `emit` clones the
//! current list before invoking anything, so a callback may unsubscribe
//! itself (or others) without deadlocking.

use std::sync::{
  Arc, Mutex, PoisonError,
  atomic::{AtomicU64, Ordering},
};

/// Handle returned by [`Listeners::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Listeners<T> {
  next_id:   AtomicU64,
  callbacks: Mutex<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Default for Listeners<T> {
  fn default() -> Self {
    Self { next_id: AtomicU64::new(0), callbacks: Mutex::new(Vec::new()) }
  }
}

impl<T> Listeners<T> {
  pub fn new() -> Self { Self::default() }

  pub fn subscribe(
    &self,
    callback: impl Fn(&T) + Send + Sync + 'static,
  ) -> SubscriptionId {
    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self
      .callbacks
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push((id, Arc::new(callback)));
    id
  }

  /// Returns `false` if `id` was not subscribed.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut callbacks =
      self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
    let before = callbacks.len();
    callbacks.retain(|(sid, _)| *sid != id);
    callbacks.len() != before
  }

  pub fn clear(&self) {
    self
      .callbacks
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clear();
  }

  pub fn len(&self) -> usize {
    self.callbacks.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  pub fn emit(&self, event: &T) {
    let snapshot: Vec<Callback<T>> = self
      .callbacks
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .map(|(_, cb)| Arc::clone(cb))
      .collect();
    for cb in snapshot {
      cb(event);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  #[test]
  fn unsubscribed_callbacks_are_not_invoked() {
    let listeners = Listeners::<u32>::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let h = hits.clone();
    let id = listeners.subscribe(move |n| {
      h.fetch_add(*n as usize, Ordering::SeqCst);
    });
    listeners.emit(&2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    assert!(listeners.unsubscribe(id));
    assert!(!listeners.unsubscribe(id));
    listeners.emit(&5);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(listeners.is_empty());
  }
}
