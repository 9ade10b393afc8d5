//! Core types and trait definitions for Pacer fitness challenges.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! rules that decide whether a challenge accepts activity, how streaks
//! advance, and which failures are permanent all live here so that every
//! backend and client applies them identically.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod activity;
pub mod challenge;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod social;
pub mod store;
pub mod streak;

pub use error::{Rejection, RejectionSource, Result};
