//! Handler capability and per-message construction.

use crate::error::{CourierError, Result};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Boxed error returned by handler implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a single handler invocation.
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Trait for processing one delivered message.
///
/// A context builds a fresh handler for every message it delivers, so
/// implementations should not rely on state surviving between invocations.
#[async_trait]
pub trait Handler<M>: Send + Sync + 'static
where
    M: Send + 'static,
{
    /// Processes one message.
    ///
    /// # Arguments
    /// * `message` - The delivered message
    ///
    /// # Errors
    /// Any error is reported to the owning context's error sink.
    async fn invoke(&self, message: M) -> HandlerResult;
}

/// Wrapper to convert an async closure into a [`Handler`].
#[derive(Clone)]
pub struct FnHandler<F> {
    handler: F,
}

impl<F> FnHandler<F> {
    /// Creates a new function handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<M, F, Fut> Handler<M> for FnHandler<F>
where
    M: Send + 'static,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn invoke(&self, message: M) -> HandlerResult {
        (self.handler)(message).await
    }
}

/// Constructor reference used to build one handler per delivered message.
pub struct HandlerFactory<H> {
    make: Arc<dyn Fn() -> H + Send + Sync>,
}

impl<H> HandlerFactory<H> {
    /// Creates a factory from a constructor function.
    pub fn new<F>(make: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
    {
        Self {
            make: Arc::new(make),
        }
    }

    /// Builds a fresh handler instance.
    #[inline]
    pub fn build(&self) -> H {
        (self.make)()
    }
}

impl<H> Clone for HandlerFactory<H> {
    fn clone(&self) -> Self {
        Self {
            make: Arc::clone(&self.make),
        }
    }
}

impl<H: Default + 'static> Default for HandlerFactory<H> {
    fn default() -> Self {
        Self::new(H::default)
    }
}

impl<H> std::fmt::Debug for HandlerFactory<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFactory")
            .field("handler", &std::any::type_name::<H>())
            .finish()
    }
}

/// Invokes `handler` with `message`, turning errors and panics into [`CourierError`].
///
/// # Errors
/// Returns `Handler` if the handler failed and `HandlerPanicked` if it panicked.
pub async fn dispatch<M, H>(handler: H, message: M) -> Result<()>
where
    M: Send + 'static,
    H: Handler<M>,
{
    match AssertUnwindSafe(handler.invoke(message)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CourierError::handler(e.to_string())),
        Err(payload) => Err(CourierError::HandlerPanicked {
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
