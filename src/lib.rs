//! Notification Service - Redis-driven webhook dispatcher
//!
//! Listens for subscription events on a Redis pub/sub channel and delivers
//! each one, with bounded retries, to every callback URL registered in the
//! database.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod decoder;
pub mod delivery;
pub mod dispatcher;
pub mod internal_metrics;
pub mod listener;
pub mod registry;
pub mod task_manager;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export core types for convenience
pub use core::*;
