//! Reconnect detection.
//!
//! The monitor keeps a "was disconnected" latch. Going offline sets it; the
//! first online event after that clears it and starts one queue drain in the
//! background. The caller never waits for the drain and never sees its
//! errors; they are logged here and the queue retries on the next trigger.

use std::{
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use tokio::{
  sync::{mpsc, watch},
  task::JoinHandle,
};

use crate::{
  executor::ActionExecutor,
  queue::{ActionQueue, DrainReport},
  repository::QueueRepository,
};

/// Anything the monitor can ask to drain.
pub trait QueueDrain: Send + Sync + 'static {
  fn drain(&self) -> impl Future<Output = DrainReport> + Send + '_;
}

impl<R, E> QueueDrain for ActionQueue<R, E>
where
  R: QueueRepository,
  E: ActionExecutor,
{
  fn drain(&self) -> impl Future<Output = DrainReport> + Send + '_ {
    self.process_queue()
  }
}

pub struct ConnectivityMonitor<Q> {
  queue:            Arc<Q>,
  was_disconnected: AtomicBool,
  status:           watch::Sender<bool>,
}

impl<Q: QueueDrain> ConnectivityMonitor<Q> {
  /// `connected` is the result of the eager reachability check at startup.
  pub fn new(queue: Arc<Q>, connected: bool) -> Self {
    let (status, _) = watch::channel(connected);
    Self {
      queue,
      was_disconnected: AtomicBool::new(!connected),
      status,
    }
  }

  pub fn is_connected(&self) -> bool { *self.status.borrow() }

  /// Observe connectivity changes.
  pub fn subscribe(&self) -> watch::Receiver<bool> { self.status.subscribe() }

  /// Feed one reachability event. Returns the handle of the background
  /// drain when this event is an offline → online transition.
  pub fn handle_event(&self, connected: bool) -> Option<JoinHandle<()>> {
    self.status.send_if_modified(|current| {
      let changed = *current != connected;
      *current = connected;
      changed
    });

    if !connected {
      if !self.was_disconnected.swap(true, Ordering::AcqRel) {
        tracing::info!("connectivity lost");
      }
      return None;
    }

    if !self.was_disconnected.swap(false, Ordering::AcqRel) {
      return None;
    }

    tracing::info!("connectivity restored; draining action queue");
    let queue = Arc::clone(&self.queue);
    let drain = tokio::spawn(async move { queue.drain().await });
    Some(tokio::spawn(async move {
      match drain.await {
        Ok(report) if report.skipped => {
          tracing::debug!("reconnect drain skipped; another drain is running");
        }
        Ok(report) => {
          tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            remaining = report.remaining,
            "reconnect drain finished"
          );
        }
        Err(e) => tracing::error!(error = %e, "reconnect drain aborted"),
      }
    }))
  }

  /// Consume reachability events from `events` until the sender is dropped.
  pub fn spawn_listener(
    self: Arc<Self>,
    mut events: mpsc::Receiver<bool>,
  ) -> JoinHandle<()> {
    tokio::spawn(async move {
      while let Some(connected) = events.recv().await {
        self.handle_event(connected);
      }
      tracing::debug!("connectivity event source closed");
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  #[derive(Default)]
  struct CountingQueue {
    drains: AtomicUsize,
  }

  impl QueueDrain for CountingQueue {
    fn drain(&self) -> impl Future<Output = DrainReport> + Send + '_ {
      async move {
        self.drains.fetch_add(1, Ordering::SeqCst);
        DrainReport::default()
      }
    }
  }

  fn drains(q: &CountingQueue) -> usize { q.drains.load(Ordering::SeqCst) }

  #[tokio::test]
  async fn drains_once_per_reconnect() {
    let queue = Arc::new(CountingQueue::default());
    let monitor = ConnectivityMonitor::new(queue.clone(), true);

    // Online while already online: no transition.
    assert!(monitor.handle_event(true).is_none());

    assert!(monitor.handle_event(false).is_none());
    assert!(monitor.handle_event(false).is_none());
    assert!(!monitor.is_connected());

    monitor.handle_event(true).unwrap().await.unwrap();
    assert_eq!(drains(&queue), 1);
    assert!(monitor.is_connected());

    // The latch was cleared by the first online event.
    assert!(monitor.handle_event(true).is_none());
    assert_eq!(drains(&queue), 1);
  }

  #[tokio::test]
  async fn starting_offline_arms_the_latch() {
    let queue = Arc::new(CountingQueue::default());
    let monitor = ConnectivityMonitor::new(queue.clone(), false);

    monitor.handle_event(true).unwrap().await.unwrap();
    assert_eq!(drains(&queue), 1);
  }

  #[tokio::test]
  async fn listener_forwards_events() {
    let queue = Arc::new(CountingQueue::default());
    let monitor = Arc::new(ConnectivityMonitor::new(queue.clone(), true));
    let mut status = monitor.subscribe();
    let (tx, rx) = mpsc::channel(8);
    let listener = monitor.clone().spawn_listener(rx);

    tx.send(false).await.unwrap();
    status.changed().await.unwrap();
    assert!(!*status.borrow_and_update());

    tx.send(true).await.unwrap();
    status.changed().await.unwrap();
    assert!(*status.borrow_and_update());

    drop(tx);
    listener.await.unwrap();
    // The drain task was spawned before the listener exited; let it run.
    for _ in 0..16 {
      if drains(&queue) == 1 {
        break;
      }
      tokio::task::yield_now().await;
    }
    assert_eq!(drains(&queue), 1);
  }
}
