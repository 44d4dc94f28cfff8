//! # Courier Shared Memory
//!
//! Cross-process message delivery through a named, fixed-size shared segment.
//!
//! This crate provides:
//! - [`SharedMemoryContext`] - Writer and polling reader for one segment
//! - [`SegmentConfig`] - Name, capacity, location and cadence settings
//! - [`Framing`] - How a message is laid out inside the segment
//! - [`SharedSegment`] - The memory-mapped region itself
//! - [`CrossProcessLock`] - Named lock serializing access across processes
//!
//! The segment is a single-slot mailbox: each write replaces the previous
//! message, and the reader delivers whatever is in the slot on every poll
//! until it is overwritten.

pub mod config;
pub mod context;
pub mod framing;
pub mod lock;
pub mod segment;

pub use config::{
    DEFAULT_CAPACITY, DEFAULT_POLL_INTERVAL, GLOBAL_PREFIX, MUTEX_SUFFIX, SegmentConfig,
};
pub use context::SharedMemoryContext;
pub use framing::Framing;
pub use lock::{CrossProcessLock, LockGuard};
pub use segment::SharedSegment;
pub use tokio_util::sync::CancellationToken;
