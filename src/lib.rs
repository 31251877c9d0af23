//! # Clanwatch
//!
//! Keeps a Discord gateway session alive and tracks clan war and capital raid
//! state with caches that refresh themselves when the game state is about to
//! change.
//!
//! - [`gateway`]: the gateway client, heartbeats, resume and reconnect.
//! - [`cache`]: get-or-refresh cache with adaptive refresh deadlines.
//! - [`api`] and [`model`]: the Clash of Clans api and its war/raid types.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod model;
pub mod scheduler;
pub mod sink;

mod error;
pub use error::{BoxError, Error, Result};
