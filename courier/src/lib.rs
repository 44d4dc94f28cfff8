//! # Courier
//!
//! Typed message delivery inside one process or between processes on the
//! same machine.
//!
//! ## Features
//!
//! - **In-process queues** - Bounded or unbounded queues, one background
//!   reader per (message, handler) pair, fresh handler per message
//! - **Shared-memory mailbox** - A named, fixed-size segment written by any
//!   process and polled by a background reader
//! - **Observable faults** - Handler errors and panics go to an error sink,
//!   readers never die silently
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier::prelude::*;
//!
//! let ctx = ChannelContext::new(ChannelConfig::default());
//! ctx.write::<Order, OrderHandler>(order, true).await?;
//!
//! let mailbox = SharedMemoryContext::new("quotes", HandlerFactory::<QuoteHandler>::default())?;
//! mailbox.start(CancellationToken::new());
//! mailbox.write(&quote).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`] - Handler capability, errors, text messages, error sinks
//! - [`channel`] - In-process channel context
//! - [`shm`] - Cross-process shared-memory context

pub mod prelude;

/// Handler, error and message contracts.
pub mod core {
    pub use courier_core::*;
}

/// In-process channel context.
pub mod channel {
    pub use courier_channel::*;
}

/// Cross-process shared-memory context.
pub mod shm {
    pub use courier_shm::*;
}

pub use courier_channel::{ChannelConfig, ChannelContext};
pub use courier_core::{CourierError, Handler, HandlerFactory, Result};
pub use courier_shm::{SegmentConfig, SharedMemoryContext};
