//! Process-wide queue registry.

use crate::config::{ChannelConfig, QueueMode};
use crate::queue::{self, Queue, QueueKey, QueueStats};
use courier_core::{ErrorSink, Handler, HandlerFactory, Result, TracingErrorSink};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type AnyQueue = Arc<dyn Any + Send + Sync>;

struct Inner {
    config: ChannelConfig,
    queues: RwLock<HashMap<QueueKey, AnyQueue>>,
    sink: Arc<dyn ErrorSink>,
}

/// Registry of in-process queues.
///
/// Build one at startup and hand clones to producers. Each distinct
/// [`QueueKey`] gets exactly one queue and one reader, created on first use
/// and kept for the lifetime of the context.
#[derive(Clone)]
pub struct ChannelContext {
    inner: Arc<Inner>,
}

impl ChannelContext {
    /// Creates a context whose faults are logged through `tracing`.
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingErrorSink))
    }

    /// Creates a context reporting handler faults to `sink`.
    #[must_use]
    pub fn with_sink(config: ChannelConfig, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                queues: RwLock::new(HashMap::new()),
                sink,
            }),
        }
    }

    /// Returns the context configuration.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Returns the queue for `M` handled by `H`, creating it on first use.
    ///
    /// `factory` is only used when this call creates the queue; later calls
    /// for the same key get the existing queue and their factory is dropped.
    ///
    /// # Panics
    /// Panics if the queue has to be created outside a Tokio runtime.
    pub fn queue<M, H>(&self, mode: QueueMode, factory: HandlerFactory<H>) -> Queue<M>
    where
        M: Send + 'static,
        H: Handler<M>,
    {
        self.get_or_create(mode, || factory)
    }

    /// Writes a message to the queue for `M` handled by `H`.
    ///
    /// Handlers are built with `H::default()`. On the bounded queue the call
    /// waits while the queue is full.
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the queue's reader has stopped.
    pub async fn write<M, H>(&self, message: M, bounded: bool) -> Result<()>
    where
        M: Send + 'static,
        H: Handler<M> + Default,
    {
        let mode = QueueMode::from_bounded(bounded);
        let queue = self.get_or_create::<M, H, _>(mode, HandlerFactory::default);
        queue.send(message).await
    }

    /// Writes a message, building handlers with `factory` if the queue is new.
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the queue's reader has stopped.
    pub async fn write_with<M, H>(
        &self,
        message: M,
        bounded: bool,
        factory: HandlerFactory<H>,
    ) -> Result<()>
    where
        M: Send + 'static,
        H: Handler<M>,
    {
        let queue = self.queue::<M, H>(QueueMode::from_bounded(bounded), factory);
        queue.send(message).await
    }

    /// Returns counters for an existing queue.
    #[must_use]
    pub fn stats<M, H>(&self, mode: QueueMode) -> Option<QueueStats>
    where
        M: Send + 'static,
        H: 'static,
    {
        self.lookup::<M>(&QueueKey::of::<M, H>(mode))
            .map(|queue| queue.stats())
    }

    /// Returns the number of queues created so far.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.inner.queues.read().len()
    }

    fn lookup<M: Send + 'static>(&self, key: &QueueKey) -> Option<Queue<M>> {
        self.inner
            .queues
            .read()
            .get(key)
            .and_then(|q| q.downcast_ref::<Queue<M>>())
            .cloned()
    }

    fn get_or_create<M, H, F>(&self, mode: QueueMode, factory: F) -> Queue<M>
    where
        M: Send + 'static,
        H: Handler<M>,
        F: FnOnce() -> HandlerFactory<H>,
    {
        let key = QueueKey::of::<M, H>(mode);
        if let Some(queue) = self.lookup::<M>(&key) {
            return queue;
        }

        let mut queues = self.inner.queues.write();
        // Another writer may have created it between the two lock acquisitions.
        if let Some(queue) = queues
            .get(&key)
            .and_then(|q| q.downcast_ref::<Queue<M>>())
        {
            return queue.clone();
        }

        let queue = queue::spawn::<M, H>(
            key.clone(),
            &self.inner.config,
            factory(),
            Arc::clone(&self.inner.sink),
        );
        queues.insert(key, Arc::new(queue.clone()));
        queue
    }
}

impl Default for ChannelContext {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl std::fmt::Debug for ChannelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelContext")
            .field("config", &self.inner.config)
            .field("queues", &self.queue_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchMode;
    use async_trait::async_trait;
    use courier_core::{DeliveryFault, FnErrorSink, HandlerResult};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    type Log = Arc<Mutex<Vec<u64>>>;

    struct Recorder {
        log: Log,
    }

    #[async_trait]
    impl Handler<u64> for Recorder {
        async fn invoke(&self, message: u64) -> HandlerResult {
            self.log.lock().push(message);
            Ok(())
        }
    }

    struct OtherRecorder {
        log: Log,
    }

    #[async_trait]
    impl Handler<u64> for OtherRecorder {
        async fn invoke(&self, message: u64) -> HandlerResult {
            self.log.lock().push(message);
            Ok(())
        }
    }

    fn recorder(log: &Log) -> HandlerFactory<Recorder> {
        let log = Arc::clone(log);
        HandlerFactory::new(move || Recorder {
            log: Arc::clone(&log),
        })
    }

    fn other_recorder(log: &Log) -> HandlerFactory<OtherRecorder> {
        let log = Arc::clone(log);
        HandlerFactory::new(move || OtherRecorder {
            log: Arc::clone(&log),
        })
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unbounded_sequential_preserves_order() {
        let ctx =
            ChannelContext::new(ChannelConfig::default().dispatch(DispatchMode::Sequential));
        let log = Log::default();

        for i in 0..500u64 {
            ctx.write_with(i, false, recorder(&log)).await.unwrap();
        }

        wait_until(|| log.lock().len() == 500).await;
        assert_eq!(*log.lock(), (0..500).collect::<Vec<_>>());

        let stats = ctx.stats::<u64, Recorder>(QueueMode::Unbounded).unwrap();
        assert_eq!(stats.enqueued, 500);
        assert_eq!(stats.dequeued, 500);
        assert_eq!(stats.completed, 500);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unbounded_concurrent_delivers_each_once() {
        let ctx = ChannelContext::default();
        let log = Log::default();
        let queue = ctx.queue::<u64, Recorder>(QueueMode::Unbounded, recorder(&log));

        for i in 0..200 {
            queue.send(i).await.unwrap();
        }

        wait_until(|| queue.stats().completed == 200).await;
        let mut seen = log.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..200).collect::<Vec<_>>());
        assert_eq!(queue.capacity(), None);
    }

    static DEFAULT_HANDLED: AtomicU64 = AtomicU64::new(0);

    #[derive(Default)]
    struct SummingHandler;

    #[async_trait]
    impl Handler<u32> for SummingHandler {
        async fn invoke(&self, message: u32) -> HandlerResult {
            DEFAULT_HANDLED.fetch_add(u64::from(message), Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_write_with_default_handler() {
        let ctx = ChannelContext::default();
        for i in 1..=10u32 {
            ctx.write::<u32, SummingHandler>(i, i % 2 == 0).await.unwrap();
        }

        wait_until(|| DEFAULT_HANDLED.load(Ordering::SeqCst) == 55).await;
        assert_eq!(ctx.queue_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_is_singleton_per_key() {
        let ctx = ChannelContext::default();
        let first_log = Log::default();
        let second_log = Log::default();

        let first = ctx.queue::<u64, Recorder>(QueueMode::Unbounded, recorder(&first_log));
        let second = ctx.queue::<u64, Recorder>(QueueMode::Unbounded, recorder(&second_log));
        assert_eq!(first.key(), second.key());
        assert_eq!(ctx.queue_count(), 1);

        second.send(7).await.unwrap();
        wait_until(|| first.stats().completed == 1).await;
        assert_eq!(*first_log.lock(), vec![7]);
        assert!(second_log.lock().is_empty());

        let bounded = ctx.queue::<u64, Recorder>(QueueMode::Bounded, recorder(&first_log));
        assert_eq!(bounded.capacity(), Some(1000));
        assert_eq!(ctx.queue_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_cross_delivery_between_handlers() {
        let ctx = ChannelContext::default();
        let a_log = Log::default();
        let b_log = Log::default();

        for i in 0..50u64 {
            ctx.write_with(i, false, recorder(&a_log)).await.unwrap();
        }
        for i in 1000..1020u64 {
            ctx.write_with(i, false, other_recorder(&b_log)).await.unwrap();
        }

        wait_until(|| a_log.lock().len() == 50 && b_log.lock().len() == 20).await;
        assert!(a_log.lock().iter().all(|&m| m < 1000));
        assert!(b_log.lock().iter().all(|&m| m >= 1000));
        assert!(ctx.stats::<u64, OtherRecorder>(QueueMode::Bounded).is_none());
    }

    struct Gated {
        gate: Arc<Semaphore>,
        started: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Handler<u64> for Gated {
        async fn invoke(&self, _message: u64) -> HandlerResult {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await?.forget();
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bounded_queue_waits_when_full() {
        let ctx =
            ChannelContext::new(ChannelConfig::default().dispatch(DispatchMode::Sequential));
        let gate = Arc::new(Semaphore::new(0));
        let started = Arc::new(AtomicU64::new(0));
        let factory = {
            let gate = Arc::clone(&gate);
            let started = Arc::clone(&started);
            HandlerFactory::new(move || Gated {
                gate: Arc::clone(&gate),
                started: Arc::clone(&started),
            })
        };
        let queue = ctx.queue::<u64, Gated>(QueueMode::Bounded, factory);

        // First message is held by the blocked handler, freeing its slot.
        queue.send(0).await.unwrap();
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;

        tokio::time::timeout(Duration::from_secs(10), async {
            for i in 1..=1000 {
                queue.send(i).await.unwrap();
            }
        })
        .await
        .expect("queue filled without waiting");

        let pending = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.send(1001).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pending.is_finished());
        assert_eq!(queue.stats().enqueued, 1001);

        gate.add_permits(1);
        tokio::time::timeout(Duration::from_secs(10), pending)
            .await
            .expect("write still waiting after space freed")
            .unwrap()
            .unwrap();

        gate.add_permits(10_000);
        wait_until(|| queue.stats().completed == 1002).await;
        assert_eq!(queue.stats().failed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_on_bounded_queue() {
        let ctx = ChannelContext::new(ChannelConfig::default().bounded_capacity(16));
        let log = Log::default();

        let producers: Vec<_> = (0..3u64)
            .map(|p| {
                let ctx = ctx.clone();
                let factory = recorder(&log);
                tokio::spawn(async move {
                    for i in 0..100u64 {
                        ctx.write_with(p * 1000 + i, true, factory.clone())
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        wait_until(|| {
            ctx.stats::<u64, Recorder>(QueueMode::Bounded)
                .is_some_and(|s| s.completed == 300)
        })
        .await;

        let stats = ctx.stats::<u64, Recorder>(QueueMode::Bounded).unwrap();
        assert_eq!(stats.enqueued, 300);
        assert_eq!(stats.dequeued, 300);

        let mut seen = log.lock().clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 300);
    }

    struct Faulty;

    #[async_trait]
    impl Handler<u64> for Faulty {
        async fn invoke(&self, message: u64) -> HandlerResult {
            if message % 10 == 0 {
                panic!("cannot handle {}", message);
            }
            if message % 2 == 1 {
                return Err(format!("odd message {}", message).into());
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handler_faults_are_reported_and_reader_survives() {
        let faults = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = {
            let faults = Arc::clone(&faults);
            FnErrorSink::new(move |fault: &DeliveryFault| {
                faults.lock().push(fault.error.to_string());
            })
        };
        let ctx = ChannelContext::with_sink(
            ChannelConfig::default().dispatch(DispatchMode::Sequential),
            Arc::new(sink),
        );
        let queue =
            ctx.queue::<u64, Faulty>(QueueMode::Unbounded, HandlerFactory::new(|| Faulty));

        for i in 0..20 {
            queue.send(i).await.unwrap();
        }
        wait_until(|| queue.stats().dequeued == 20 && queue.stats().in_flight() == 0).await;

        let stats = queue.stats();
        assert_eq!(stats.completed, 8);
        assert_eq!(stats.failed, 12);
        assert_eq!(faults.lock().len(), 12);
        assert!(faults.lock().iter().any(|f| f.contains("cannot handle 10")));

        // Still alive after the faults.
        queue.send(2).await.unwrap();
        wait_until(|| queue.stats().completed == 9).await;
    }
}
