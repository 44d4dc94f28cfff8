//! Queues and their background readers.

use crate::config::{ChannelConfig, DispatchMode, QueueMode};
use courier_core::{
    CourierError, DeliveryFault, ErrorSink, Handler, HandlerFactory, Result, dispatch,
};
use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Identifies one logical queue.
///
/// Two writes share a queue when they name the same message type, the same
/// handler type and the same mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    message: TypeId,
    handler: TypeId,
    mode: QueueMode,
    message_name: &'static str,
    handler_name: &'static str,
}

impl QueueKey {
    /// Creates the key for message type `M` handled by `H`.
    #[must_use]
    pub fn of<M: 'static, H: 'static>(mode: QueueMode) -> Self {
        Self {
            message: TypeId::of::<M>(),
            handler: TypeId::of::<H>(),
            mode,
            message_name: std::any::type_name::<M>(),
            handler_name: std::any::type_name::<H>(),
        }
    }

    /// Returns the queue mode.
    #[must_use]
    pub fn mode(&self) -> QueueMode {
        self.mode
    }
}

impl std::fmt::Display for QueueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} => {} ({:?})",
            self.message_name, self.handler_name, self.mode
        )
    }
}

/// Snapshot of a queue's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages accepted by `send`.
    pub enqueued: u64,
    /// Messages taken off the queue by the reader.
    pub dequeued: u64,
    /// Handler invocations that returned `Ok`.
    pub completed: u64,
    /// Handler invocations that failed or panicked.
    pub failed: u64,
}

impl QueueStats {
    /// Dequeued messages whose handler has not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.dequeued.saturating_sub(self.completed + self.failed)
    }
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Acquire),
            dequeued: self.dequeued.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        }
    }
}

enum QueueSender<M> {
    Unbounded(mpsc::UnboundedSender<M>),
    Bounded(mpsc::Sender<M>),
}

impl<M> Clone for QueueSender<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
        }
    }
}

enum QueueReceiver<M> {
    Unbounded(mpsc::UnboundedReceiver<M>),
    Bounded(mpsc::Receiver<M>),
}

impl<M> QueueReceiver<M> {
    async fn recv(&mut self) -> Option<M> {
        match self {
            Self::Unbounded(rx) => rx.recv().await,
            Self::Bounded(rx) => rx.recv().await,
        }
    }
}

/// Producer handle for one queue.
///
/// Cloning is cheap; every clone feeds the same reader.
pub struct Queue<M> {
    key: QueueKey,
    sender: QueueSender<M>,
    counters: Arc<Counters>,
}

impl<M> Clone for Queue<M> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            sender: self.sender.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<M: Send + 'static> Queue<M> {
    /// Enqueues a message.
    ///
    /// On a bounded queue this waits while the queue is full; it never drops
    /// the message.
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the reader has stopped.
    pub async fn send(&self, message: M) -> Result<()> {
        // Keeps enqueued >= dequeued in every snapshot.
        let pending = PendingSend::new(&self.counters.enqueued);
        let sent = match &self.sender {
            QueueSender::Unbounded(tx) => tx.send(message).is_ok(),
            QueueSender::Bounded(tx) => tx.send(message).await.is_ok(),
        };
        if !sent {
            return Err(CourierError::channel_closed(self.key.to_string()));
        }
        pending.commit();
        Ok(())
    }

    /// Returns the queue key.
    #[must_use]
    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    /// Returns a snapshot of the queue counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    /// Returns the capacity of a bounded queue, `None` when unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        match &self.sender {
            QueueSender::Unbounded(_) => None,
            QueueSender::Bounded(tx) => Some(tx.max_capacity()),
        }
    }

    /// Returns true once the reader has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match &self.sender {
            QueueSender::Unbounded(tx) => tx.is_closed(),
            QueueSender::Bounded(tx) => tx.is_closed(),
        }
    }
}

/// Counts a send up front and takes it back unless committed, including
/// when a bounded send is dropped while waiting for room.
struct PendingSend<'a> {
    counter: &'a AtomicU64,
    committed: bool,
}

impl<'a> PendingSend<'a> {
    fn new(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self {
            counter,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingSend<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Creates a queue and spawns its reader on the current Tokio runtime.
///
/// # Panics
/// Panics if called outside a Tokio runtime.
pub(crate) fn spawn<M, H>(
    key: QueueKey,
    config: &ChannelConfig,
    factory: HandlerFactory<H>,
    sink: Arc<dyn ErrorSink>,
) -> Queue<M>
where
    M: Send + 'static,
    H: Handler<M>,
{
    let (sender, receiver) = match key.mode() {
        QueueMode::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
        QueueMode::Bounded => {
            let (tx, rx) = mpsc::channel(config.bounded_capacity.max(1));
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
    };

    let counters = Arc::new(Counters::default());
    let reader = Reader {
        origin: Arc::from(key.to_string()),
        dispatch: config.dispatch,
        factory,
        counters: Arc::clone(&counters),
        sink,
    };

    tracing::debug!("Spawning reader for queue {}", key);
    tokio::spawn(reader.run(receiver));

    Queue {
        key,
        sender,
        counters,
    }
}

struct Reader<H> {
    origin: Arc<str>,
    dispatch: DispatchMode,
    factory: HandlerFactory<H>,
    counters: Arc<Counters>,
    sink: Arc<dyn ErrorSink>,
}

impl<H> Reader<H> {
    async fn run<M>(self, mut receiver: QueueReceiver<M>)
    where
        M: Send + 'static,
        H: Handler<M>,
    {
        while let Some(message) = receiver.recv().await {
            self.counters.dequeued.fetch_add(1, Ordering::AcqRel);
            let handler = self.factory.build();

            match self.dispatch {
                DispatchMode::Concurrent => {
                    let origin = Arc::clone(&self.origin);
                    let counters = Arc::clone(&self.counters);
                    let sink = Arc::clone(&self.sink);
                    tokio::spawn(async move {
                        deliver(&origin, handler, message, &counters, sink.as_ref()).await;
                    });
                }
                DispatchMode::Sequential => {
                    deliver(
                        &self.origin,
                        handler,
                        message,
                        &self.counters,
                        self.sink.as_ref(),
                    )
                    .await;
                }
            }
        }

        tracing::debug!("Reader for queue {} stopped", self.origin);
    }
}

async fn deliver<M, H>(
    origin: &str,
    handler: H,
    message: M,
    counters: &Counters,
    sink: &dyn ErrorSink,
) where
    M: Send + 'static,
    H: Handler<M>,
{
    match dispatch(handler, message).await {
        Ok(()) => {
            counters.completed.fetch_add(1, Ordering::AcqRel);
        }
        Err(error) => {
            counters.failed.fetch_add(1, Ordering::AcqRel);
            sink.report(&DeliveryFault::new(origin, error));
        }
    }
}
