//! Bullet - a webhook relay for alerts
//!
//! Receives alert webhooks from monitoring sources, normalizes them into a
//! common [`Event`], and forwards each event to the channels of the first
//! matching route.

pub mod app;
pub mod channels;
pub mod cli;
pub mod config;
pub mod core;
pub mod formatting;
pub mod internal_metrics;
pub mod router;
pub mod routes;
pub mod server;
pub mod sources;
pub mod task_manager;

// Re-export core types for convenience
pub use core::*;
