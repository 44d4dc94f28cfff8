//! # Courier Channel
//!
//! In-process message delivery.
//!
//! This crate provides:
//! - [`ChannelContext`] - Registry owning one queue per (message, handler, mode) key
//! - [`Queue`] - Producer handle for a single queue
//! - [`ChannelConfig`] - Capacity and dispatch settings
//!
//! Every queue is drained by exactly one background reader task that builds a
//! fresh handler for each message.

pub mod config;
pub mod context;
pub mod queue;

pub use config::{ChannelConfig, DEFAULT_BOUNDED_CAPACITY, DispatchMode, QueueMode};
pub use context::ChannelContext;
pub use queue::{Queue, QueueKey, QueueStats};
