//! Prelude module for convenient imports.
//!
//! ```ignore
//! use courier::prelude::*;
//! ```

pub use courier_core::{
    BoxError, CourierError, DeliveryFault, ErrorSink, FnErrorSink, FnHandler, Handler,
    HandlerFactory, HandlerResult, Result, TextMessage, TracingErrorSink,
};

pub use courier_channel::{
    ChannelConfig, ChannelContext, DispatchMode, Queue, QueueKey, QueueMode, QueueStats,
};

pub use courier_shm::{
    CancellationToken, CrossProcessLock, Framing, SegmentConfig, SharedMemoryContext,
};
