//! Channel configuration.

/// Capacity of a bounded queue unless configured otherwise.
pub const DEFAULT_BOUNDED_CAPACITY: usize = 1000;

/// Capacity policy of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueMode {
    /// No capacity limit; producers never wait.
    Unbounded,
    /// Limited capacity; producers wait while the queue is full.
    Bounded,
}

impl QueueMode {
    /// Maps the `bounded` flag of a write to a mode.
    #[must_use]
    pub fn from_bounded(bounded: bool) -> Self {
        if bounded { Self::Bounded } else { Self::Unbounded }
    }
}

/// How the reader hands dequeued messages to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Each invocation runs as its own task; the reader does not wait for it.
    #[default]
    Concurrent,
    /// The reader awaits each invocation before dequeuing the next message.
    Sequential,
}

/// Configuration shared by all queues of a [`crate::ChannelContext`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Capacity of bounded queues.
    pub bounded_capacity: usize,
    /// Dispatch strategy of every reader.
    pub dispatch: DispatchMode,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bounded_capacity: DEFAULT_BOUNDED_CAPACITY,
            dispatch: DispatchMode::Concurrent,
        }
    }
}

impl ChannelConfig {
    /// Sets the bounded queue capacity (at least 1).
    #[must_use]
    pub fn bounded_capacity(mut self, capacity: usize) -> Self {
        self.bounded_capacity = capacity.max(1);
        self
    }

    /// Sets the dispatch mode.
    #[must_use]
    pub fn dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_default() {
        let config = ChannelConfig::default();
        assert_eq!(config.bounded_capacity, 1000);
        assert_eq!(config.dispatch, DispatchMode::Concurrent);
    }

    #[test]
    fn test_channel_config_setters() {
        let config = ChannelConfig::default()
            .bounded_capacity(0)
            .dispatch(DispatchMode::Sequential);
        assert_eq!(config.bounded_capacity, 1);
        assert_eq!(config.dispatch, DispatchMode::Sequential);
    }

    #[test]
    fn test_queue_mode_from_bounded() {
        assert_eq!(QueueMode::from_bounded(true), QueueMode::Bounded);
        assert_eq!(QueueMode::from_bounded(false), QueueMode::Unbounded);
    }
}
