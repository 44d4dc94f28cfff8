//! # Courier Core
//!
//! Contracts shared by every Courier delivery context.
//!
//! This crate provides:
//! - [`error`] - Error taxonomy for writes, reads and dispatch
//! - [`handler`] - The single-method handler capability and its factory
//! - [`message`] - Text conversion contract for shared-memory payloads
//! - [`sink`] - Error sinks that observe faults raised in background loops

pub mod error;
pub mod handler;
pub mod message;
pub mod sink;

pub use error::{CourierError, Result};
pub use handler::{BoxError, FnHandler, Handler, HandlerFactory, HandlerResult, dispatch};
pub use message::TextMessage;
pub use sink::{DeliveryFault, ErrorSink, FnErrorSink, TracingErrorSink};
