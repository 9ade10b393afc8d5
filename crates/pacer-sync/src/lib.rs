//! Client-side sync engine for Pacer.
//!
//! Mutations made while offline are buffered in a durable [`ActionQueue`]
//! and replayed against the server in order once connectivity returns. Every
//! queued action carries its own idempotency key, so replaying an action that
//! already reached the server is harmless.
//!
//! - [`queue`]: the persisted FIFO and its single-flight drain loop.
//! - [`connectivity`]: turns "was offline, now online" into one drain.
//! - [`throttle`]: debounces bursts of change hints per query key.
//! - [`observer`]: subscribe/unsubscribe registries for queue events.
//!
//! Nothing here knows about HTTP; the transport is an [`ActionExecutor`].

#![allow(async_fn_in_trait)]

pub mod action;
pub mod connectivity;
pub mod error;
pub mod executor;
pub mod observer;
pub mod queue;
pub mod repository;
pub mod throttle;

pub use action::{ActionKind, ActionPayload, QueuedAction};
pub use connectivity::ConnectivityMonitor;
pub use error::{Error, Result};
pub use executor::{ActionExecutor, ExecError, SessionProvider};
pub use queue::{ActionQueue, DrainReport, FailedAction, MAX_RETRIES};
pub use repository::{FileRepository, MemoryRepository, QueueRepository};
pub use throttle::ChangeThrottle;
