//! Shared-memory writer and polling reader.

use crate::config::SegmentConfig;
use crate::framing::Framing;
use crate::lock::{CrossProcessLock, LockGuard};
use crate::segment::SharedSegment;
use courier_core::{
    CourierError, DeliveryFault, ErrorSink, Handler, HandlerFactory, Result, TextMessage,
    TracingErrorSink, dispatch,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

struct State {
    config: SegmentConfig,
    frozen: bool,
}

struct Shared<H> {
    state: Mutex<State>,
    factory: HandlerFactory<H>,
    sink: RwLock<Arc<dyn ErrorSink>>,
}

/// Delivers messages of type `M` between processes through one named segment.
///
/// Writers replace the segment contents; a poller started with
/// [`SharedMemoryContext::start`] reads it on a fixed cadence and hands every
/// non-empty message to a fresh `H`. Nothing marks a message as consumed, so
/// the same message is delivered on every poll until it is overwritten.
pub struct SharedMemoryContext<M, H> {
    shared: Arc<Shared<H>>,
    _message: PhantomData<fn() -> M>,
}

impl<M, H> Clone for SharedMemoryContext<M, H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _message: PhantomData,
        }
    }
}

impl<M, H> SharedMemoryContext<M, H>
where
    M: TextMessage + Send + 'static,
    H: Handler<M>,
{
    /// Creates a context for segment `name` with default settings.
    ///
    /// # Errors
    /// Returns `InvalidName` for a blank name and IO error if the segment or
    /// its lock file cannot be created.
    pub fn new(name: impl Into<String>, factory: HandlerFactory<H>) -> Result<Self> {
        Self::with_config(SegmentConfig::new(name), factory)
    }

    /// Creates a context from a full configuration.
    ///
    /// Creates or opens the segment and its lock file immediately.
    ///
    /// # Errors
    /// Returns `InvalidName` for a blank name and IO error if the segment or
    /// its lock file cannot be created.
    pub fn with_config(config: SegmentConfig, factory: HandlerFactory<H>) -> Result<Self> {
        prepare(&config)?;
        tracing::debug!(
            "Opened shared segment {} ({} bytes) at {}",
            config.segment_name(),
            config.capacity,
            config.segment_path().display()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    config,
                    frozen: false,
                }),
                factory,
                sink: RwLock::new(Arc::new(TracingErrorSink)),
            }),
            _message: PhantomData,
        })
    }

    /// Sets the segment capacity.
    ///
    /// # Errors
    /// Returns `ConfigFrozen` once the context has written or started polling.
    pub fn set_capacity(&self, capacity: usize) -> Result<&Self> {
        self.update("capacity", |config| config.capacity = capacity.max(1))
    }

    /// Renames the segment; the global prefix is applied to the new name.
    ///
    /// # Errors
    /// Returns `ConfigFrozen` once the context has written or started polling,
    /// `InvalidName` for a blank name.
    pub fn set_name(&self, name: impl Into<String>) -> Result<&Self> {
        let name = name.into();
        self.update("name", |config| config.name = name)
    }

    /// Sets the poll interval.
    ///
    /// # Errors
    /// Returns `ConfigFrozen` once the context has written or started polling.
    pub fn set_poll_interval(&self, interval: Duration) -> Result<&Self> {
        self.update("poll_interval", |config| config.poll_interval = interval)
    }

    /// Sets the framing.
    ///
    /// # Errors
    /// Returns `ConfigFrozen` once the context has written or started polling.
    pub fn set_framing(&self, framing: Framing) -> Result<&Self> {
        self.update("framing", |config| config.framing = framing)
    }

    /// Replaces the sink receiving poller faults.
    pub fn set_error_sink(&self, sink: Arc<dyn ErrorSink>) -> &Self {
        *self.shared.sink.write() = sink;
        self
    }

    /// Returns a snapshot of the configuration.
    #[must_use]
    pub fn config(&self) -> SegmentConfig {
        self.shared.state.lock().config.clone()
    }

    /// Returns the path of the segment's backing file.
    #[must_use]
    pub fn segment_path(&self) -> PathBuf {
        self.shared.state.lock().config.segment_path()
    }

    /// Returns true once the configuration can no longer change.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.shared.state.lock().frozen
    }

    /// Writes `message` into the segment, replacing what was there.
    ///
    /// Recreates the segment if another process removed it. Messages that do
    /// not fit are rejected before the configuration freezes and leave the
    /// segment untouched.
    ///
    /// Dropping the returned future does not cancel a write already waiting
    /// on the segment: it still lands, but before any later write from this
    /// process.
    ///
    /// # Errors
    /// Returns `MessageTooLarge` if the framed message exceeds the capacity,
    /// `Lock` or IO error if the segment cannot be accessed.
    pub async fn write(&self, message: &M) -> Result<()> {
        let text = message.to_text();
        let current = self.config();
        current.framing.encode(&text, current.capacity)?;

        let config = self.freeze();
        let payload = config.framing.encode(&text, config.capacity)?;
        let permit = segment_permit(&config.segment_path()).await?;
        let written = payload.len();
        run_blocking(move || {
            let _permit = permit;
            write_segment(&config, &payload)
        })
        .await?;
        tracing::trace!("Wrote {} bytes to shared segment", written);
        Ok(())
    }

    /// Reads the current message without dispatching it.
    ///
    /// Returns `None` when the segment is empty.
    ///
    /// # Errors
    /// Returns `SegmentNotFound` if the segment does not exist, `Decode` if
    /// its contents cannot be converted into `M`.
    pub async fn read_once(&self) -> Result<Option<M>> {
        let _permit = segment_permit(&self.segment_path()).await?;
        self.read_current().await
    }

    /// Starts the poller.
    ///
    /// Every poll interval, until `cancel` fires, the poller reads the
    /// segment and dispatches a non-empty message to a new handler. Missing
    /// segments, conversion errors and handler faults go to the error sink
    /// and the poller carries on with the next interval. Cancellation is
    /// observed between polls, never during a dispatch.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.freeze();
        let ctx = self.clone();
        tokio::spawn(async move { ctx.poll_loop(cancel).await })
    }

    async fn poll_loop(self, cancel: CancellationToken) {
        let config = self.config();
        let origin = config.segment_name();
        tracing::info!(
            "Shared memory poller started for {} every {:?}",
            origin,
            config.poll_interval
        );

        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if cancel.is_cancelled() {
                break;
            }
            if let Err(error) = self.poll_once().await {
                self.report(&origin, error);
            }
        }

        tracing::info!("Shared memory poller stopped for {}", origin);
    }

    /// Runs one poll; returns whether a message was dispatched.
    async fn poll_once(&self) -> Result<bool> {
        let _permit = segment_permit(&self.segment_path()).await?;
        let Some(message) = self.read_current().await? else {
            return Ok(false);
        };
        dispatch(self.shared.factory.build(), message).await?;
        Ok(true)
    }

    async fn read_current(&self) -> Result<Option<M>> {
        let config = self.config();
        let framing = config.framing;
        let raw = run_blocking(move || read_segment(&config)).await?;

        let text = framing.decode(&raw)?;
        if text.is_empty() {
            return Ok(None);
        }
        M::from_text(&text).map(Some)
    }

    fn report(&self, origin: &str, error: CourierError) {
        let sink = Arc::clone(&self.shared.sink.read());
        sink.report(&DeliveryFault::new(origin, error));
    }

    fn freeze(&self) -> SegmentConfig {
        let mut state = self.shared.state.lock();
        state.frozen = true;
        state.config.clone()
    }

    fn update<F>(&self, setting: &'static str, apply: F) -> Result<&Self>
    where
        F: FnOnce(&mut SegmentConfig),
    {
        let mut state = self.shared.state.lock();
        if state.frozen {
            return Err(CourierError::ConfigFrozen { setting });
        }
        let mut next = state.config.clone();
        apply(&mut next);
        prepare(&next)?;
        state.config = next;
        Ok(self)
    }
}

impl<M, H> std::fmt::Debug for SharedMemoryContext<M, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SharedMemoryContext")
            .field("config", &state.config)
            .field("frozen", &state.frozen)
            .finish()
    }
}

type Gates = Mutex<HashMap<PathBuf, Arc<Semaphore>>>;

// One gate per segment file serializes this process's accesses to it, however
// many contexts are open on the segment.
static SEGMENT_GATES: OnceLock<Gates> = OnceLock::new();

fn segment_gate(path: &Path) -> Arc<Semaphore> {
    let gates = SEGMENT_GATES.get_or_init(Gates::default);
    let mut gates = gates.lock();
    Arc::clone(
        gates
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Semaphore::new(1))),
    )
}

async fn segment_permit(path: &Path) -> Result<OwnedSemaphorePermit> {
    segment_gate(path)
        .acquire_owned()
        .await
        .map_err(|_| CourierError::lock("segment semaphore closed"))
}

/// Validates the configuration and creates the segment and lock file.
fn prepare(config: &SegmentConfig) -> Result<()> {
    config.validate()?;
    std::fs::create_dir_all(&config.directory)?;
    SharedSegment::open_or_create(&config.segment_path(), config.capacity)?;
    CrossProcessLock::new(config.lock_name(), config.lock_path())?;
    Ok(())
}

fn lock_for(config: &SegmentConfig) -> Result<Option<LockGuard>> {
    if !config.cross_process_lock {
        return Ok(None);
    }
    CrossProcessLock::new(config.lock_name(), config.lock_path())?
        .acquire()
        .map(Some)
}

fn write_segment(config: &SegmentConfig, payload: &[u8]) -> Result<()> {
    let _guard = lock_for(config)?;
    let mut segment = SharedSegment::open_or_create(&config.segment_path(), config.capacity)?;
    let written = segment.write_at_zero(payload);
    segment.clear_from(written);
    Ok(())
}

fn read_segment(config: &SegmentConfig) -> Result<Vec<u8>> {
    let _guard = lock_for(config)?;
    let segment = SharedSegment::open_existing(
        &config.segment_path(),
        config.capacity,
        &config.segment_name(),
    )?;
    Ok(segment.read_all())
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CourierError::Io(std::io::Error::other(e)))?
}
