//! Error types for Courier operations.

use thiserror::Error;

/// Error type for Courier operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// The queue's reader is gone and no further messages can be enqueued.
    #[error("channel closed: {key}")]
    ChannelClosed {
        /// Queue the write was aimed at.
        key: String,
    },

    /// Shared segment does not exist.
    #[error("shared segment not found: {name}")]
    SegmentNotFound {
        /// Segment name.
        name: String,
    },

    /// Encoded message does not fit into the segment.
    #[error("message too large: {size} bytes exceeds segment capacity {max} bytes")]
    MessageTooLarge {
        /// Encoded size including framing.
        size: usize,
        /// Segment capacity.
        max: usize,
    },

    /// Segment contents could not be turned into a message.
    #[error("decode error: {message}")]
    Decode {
        /// Error message.
        message: String,
    },

    /// Handler returned an error.
    #[error("handler error: {message}")]
    Handler {
        /// Error message.
        message: String,
    },

    /// Handler panicked while processing a message.
    #[error("handler panicked: {message}")]
    HandlerPanicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Setting can no longer be changed.
    #[error("configuration frozen: {setting} cannot change after resources are in use")]
    ConfigFrozen {
        /// Name of the rejected setting.
        setting: &'static str,
    },

    /// Segment name is not usable.
    #[error("invalid segment name: {name:?}")]
    InvalidName {
        /// Rejected name.
        name: String,
    },

    /// Cross-process lock failure.
    #[error("lock error: {message}")]
    Lock {
        /// Error message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CourierError {
    /// Creates a channel closed error.
    pub fn channel_closed(key: impl Into<String>) -> Self {
        Self::ChannelClosed { key: key.into() }
    }

    /// Creates a message too large error.
    pub fn message_too_large(size: usize, max: usize) -> Self {
        Self::MessageTooLarge { size, max }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Creates a lock error.
    pub fn lock(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }

    /// Returns true for faults raised by handler code rather than by the transport.
    #[must_use]
    pub fn is_handler_fault(&self) -> bool {
        matches!(self, Self::Handler { .. } | Self::HandlerPanicked { .. })
    }
}

/// Result type alias for Courier operations.
pub type Result<T> = std::result::Result<T, CourierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_too_large_display() {
        let err = CourierError::message_too_large(2048, 1024);
        assert_eq!(
            err.to_string(),
            "message too large: 2048 bytes exceeds segment capacity 1024 bytes"
        );
    }

    #[test]
    fn test_io_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CourierError = io.into();
        assert!(matches!(err, CourierError::Io(_)));
    }

    #[test]
    fn test_is_handler_fault() {
        assert!(CourierError::handler("boom").is_handler_fault());
        assert!(
            CourierError::HandlerPanicked {
                message: "boom".into()
            }
            .is_handler_fault()
        );
        assert!(!CourierError::decode("bad").is_handler_fault());
        assert!(!CourierError::channel_closed("q").is_handler_fault());
    }

    #[test]
    fn test_config_frozen_display() {
        let err = CourierError::ConfigFrozen {
            setting: "capacity",
        };
        assert!(err.to_string().contains("capacity"));
    }
}
