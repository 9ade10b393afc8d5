//! Per-key trailing-edge debounce for change hints.
//!
//! A live change feed can deliver many hints for the same query in a short
//! burst. [`ChangeThrottle::notify`] (re)arms a timer for the key; the key's
//! callbacks run once, `delay` after the last notify in the burst. Keys are
//! independent of each other.
//!
//! Dropping the throttle, or calling [`ChangeThrottle::cancel_all`], aborts
//! every pending timer so no callback fires after the owner is gone.

use std::{
  collections::HashMap,
  hash::Hash,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use tokio::task::AbortHandle;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

type Callback<K> = Arc<dyn Fn(&K) + Send + Sync>;

struct Timer {
  generation: u64,
  handle:     AbortHandle,
}

struct Inner<K> {
  callbacks:       HashMap<K, Vec<(u64, Callback<K>)>>,
  timers:          HashMap<K, Timer>,
  next_id:         u64,
  next_generation: u64,
}

pub struct ChangeThrottle<K> {
  delay: Duration,
  inner: Arc<Mutex<Inner<K>>>,
}

impl<K> Default for ChangeThrottle<K>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
{
  fn default() -> Self { Self::new(DEFAULT_DELAY) }
}

impl<K> ChangeThrottle<K>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
{
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      inner: Arc::new(Mutex::new(Inner {
        callbacks:       HashMap::new(),
        timers:          HashMap::new(),
        next_id:         0,
        next_generation: 0,
      })),
    }
  }

  pub fn delay(&self) -> Duration { self.delay }

  /// Register `callback` to run when `key`'s timer fires. Returns a handle
  /// for [`unsubscribe`](Self::unsubscribe).
  pub fn on_change(
    &self,
    key: K,
    callback: impl Fn(&K) + Send + Sync + 'static,
  ) -> u64 {
    let mut inner = lock(&self.inner);
    let id = inner.next_id;
    inner.next_id += 1;
    inner
      .callbacks
      .entry(key)
      .or_default()
      .push((id, Arc::new(callback)));
    id
  }

  /// Remove one callback. The key's pending timer is cancelled once it has
  /// no callbacks left.
  pub fn unsubscribe(&self, key: &K, id: u64) -> bool {
    let mut inner = lock(&self.inner);
    let Some(list) = inner.callbacks.get_mut(key) else {
      return false;
    };
    let before = list.len();
    list.retain(|(cid, _)| *cid != id);
    let removed = list.len() != before;
    if list.is_empty() {
      inner.callbacks.remove(key);
      if let Some(timer) = inner.timers.remove(key) {
        timer.handle.abort();
      }
    }
    removed
  }

  /// Schedule a refresh of `key`, pushing back any refresh already pending.
  /// Must be called within a tokio runtime.
  pub fn notify(&self, key: K) {
    let mut inner = lock(&self.inner);
    if let Some(timer) = inner.timers.remove(&key) {
      timer.handle.abort();
    }
    inner.next_generation += 1;
    let generation = inner.next_generation;

    let shared = Arc::clone(&self.inner);
    let delay = self.delay;
    let timer_key = key.clone();
    // The lock is held until the timer is registered, so the task can
    // never observe its own generation missing.
    let task = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      fire(&shared, &timer_key, generation);
    });

    inner.timers.insert(key, Timer { generation, handle: task.abort_handle() });
  }

  pub fn is_pending(&self, key: &K) -> bool {
    lock(&self.inner).timers.contains_key(key)
  }

  /// Abort every pending timer. Subscriptions are kept.
  pub fn cancel_all(&self) {
    let mut inner = lock(&self.inner);
    for (_, timer) in inner.timers.drain() {
      timer.handle.abort();
    }
  }
}

impl<K> Drop for ChangeThrottle<K> {
  fn drop(&mut self) {
    let mut inner = lock(&self.inner);
    for (_, timer) in inner.timers.drain() {
      timer.handle.abort();
    }
  }
}

fn lock<K>(inner: &Mutex<Inner<K>>) -> MutexGuard<'_, Inner<K>> {
  inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fire<K: Eq + Hash>(inner: &Mutex<Inner<K>>, key: &K, generation: u64) {
  let callbacks: Vec<Callback<K>> = {
    let mut inner = lock(inner);
    match inner.timers.get(key) {
      Some(timer) if timer.generation == generation => {}
      // Superseded or cancelled.
      _ => return,
    }
    inner.timers.remove(key);
    inner
      .callbacks
      .get(key)
      .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
      .unwrap_or_default()
  };
  for cb in callbacks {
    cb(key);
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use tokio::time::{Instant, sleep};

  use super::*;

  fn counter(
    throttle: &ChangeThrottle<String>,
    key: &str,
  ) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    throttle.on_change(key.to_owned(), move |_| {
      h.fetch_add(1, Ordering::SeqCst);
    });
    hits
  }

  #[tokio::test(start_paused = true)]
  async fn burst_coalesces_into_one_trailing_call() {
    let throttle = ChangeThrottle::<String>::default();
    let hits = counter(&throttle, "leaderboard:X");

    for _ in 0..5 {
      throttle.notify("leaderboard:X".to_owned());
      sleep(Duration::from_millis(50)).await;
    }
    // 50ms since the last notify; still waiting.
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    sleep(Duration::from_millis(440)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!throttle.is_pending(&"leaderboard:X".to_owned()));
  }

  #[tokio::test(start_paused = true)]
  async fn keys_do_not_delay_each_other() {
    let throttle = ChangeThrottle::<String>::default();
    let x = counter(&throttle, "leaderboard:X");
    let y = counter(&throttle, "leaderboard:Y");

    let start = Instant::now();
    throttle.notify("leaderboard:Y".to_owned());
    for _ in 0..5 {
      throttle.notify("leaderboard:X".to_owned());
      sleep(Duration::from_millis(50)).await;
    }
    // Y fired at 500ms even though X kept being poked until 200ms.
    sleep(Duration::from_millis(260)).await;
    assert!(start.elapsed() >= Duration::from_millis(510));
    assert_eq!(y.load(Ordering::SeqCst), 1);
    assert_eq!(x.load(Ordering::SeqCst), 0);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(x.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn cancel_and_unsubscribe_stop_callbacks() {
    let throttle = ChangeThrottle::<String>::default();
    let hits = counter(&throttle, "k");

    throttle.notify("k".to_owned());
    throttle.cancel_all();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let other = Arc::new(AtomicUsize::new(0));
    let o = other.clone();
    let id = throttle.on_change("k".to_owned(), move |_| {
      o.fetch_add(1, Ordering::SeqCst);
    });
    assert!(throttle.unsubscribe(&"k".to_owned(), id));

    throttle.notify("k".to_owned());
    sleep(Duration::from_secs(1)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(other.load(Ordering::SeqCst), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn drop_aborts_pending_timers() {
    let throttle = ChangeThrottle::<String>::default();
    let hits = counter(&throttle, "k");
    throttle.notify("k".to_owned());
    drop(throttle);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
  }
}
