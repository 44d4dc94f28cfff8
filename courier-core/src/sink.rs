//! Error sinks observing faults raised inside background loops.
//!
//! Writes are decoupled from handling, so a producer never sees what happens
//! to its message once it is queued. Readers report every per-message fault
//! to an [`ErrorSink`] and keep running.

use crate::error::CourierError;
use std::sync::Arc;

/// A fault raised while delivering a message.
#[derive(Debug)]
pub struct DeliveryFault {
    /// Queue key or segment name the fault came from.
    pub origin: String,
    /// The underlying error.
    pub error: CourierError,
}

impl DeliveryFault {
    /// Creates a new delivery fault.
    pub fn new(origin: impl Into<String>, error: CourierError) -> Self {
        Self {
            origin: origin.into(),
            error,
        }
    }
}

impl std::fmt::Display for DeliveryFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.origin, self.error)
    }
}

/// Receives faults from background readers.
pub trait ErrorSink: Send + Sync {
    /// Called once per fault.
    fn report(&self, fault: &DeliveryFault);
}

/// Default sink that logs faults through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, fault: &DeliveryFault) {
        tracing::error!("Delivery fault in {}: {}", fault.origin, fault.error);
    }
}

/// Wrapper to convert a closure into an [`ErrorSink`].
pub struct FnErrorSink<F> {
    sink: F,
}

impl<F> FnErrorSink<F>
where
    F: Fn(&DeliveryFault) + Send + Sync,
{
    /// Creates a new function sink.
    pub fn new(sink: F) -> Self {
        Self { sink }
    }
}

impl<F> ErrorSink for FnErrorSink<F>
where
    F: Fn(&DeliveryFault) + Send + Sync,
{
    fn report(&self, fault: &DeliveryFault) {
        (self.sink)(fault);
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for Arc<S> {
    fn report(&self, fault: &DeliveryFault) {
        (**self).report(fault);
    }
}
