//! Core types, the change-detection logic and the poll orchestrator for Qtc.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! store and the client gateway are traits implemented by
//! `qtc-store-sqlite` and `qtc-gateway`.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod detect;
pub mod error;
pub mod fields;
pub mod gateway;
pub mod poll;
pub mod record;
pub mod store;
pub mod throttle;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
