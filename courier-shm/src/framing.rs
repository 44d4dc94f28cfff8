//! Message layout inside a segment.

use bytes::BufMut;
use courier_core::{CourierError, Result};

/// Size of the length header used by [`Framing::LengthPrefixed`].
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// How a message's text is laid out inside the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Raw UTF-8 at offset 0 followed by NUL padding up to the capacity.
    #[default]
    NullPadded,
    /// `[4-byte length (little-endian)][UTF-8 text]`.
    LengthPrefixed,
}

impl Framing {
    /// Bytes added on top of the message text.
    #[must_use]
    pub fn overhead(self) -> usize {
        match self {
            Self::NullPadded => 0,
            Self::LengthPrefixed => LENGTH_PREFIX_SIZE,
        }
    }

    /// Encodes `text` for a segment of `capacity` bytes.
    ///
    /// # Errors
    /// Returns `MessageTooLarge` if the framed message does not fit.
    pub fn encode(self, text: &str, capacity: usize) -> Result<Vec<u8>> {
        let size = self.overhead() + text.len();
        if size > capacity {
            return Err(CourierError::message_too_large(size, capacity));
        }

        let mut dst = Vec::with_capacity(size);
        if self == Self::LengthPrefixed {
            let length = u32::try_from(text.len())
                .map_err(|_| CourierError::message_too_large(size, u32::MAX as usize))?;
            dst.put_u32_le(length);
        }
        dst.put_slice(text.as_bytes());
        Ok(dst)
    }

    /// Decodes the text held in a segment buffer.
    ///
    /// An all-zero buffer decodes to an empty string.
    ///
    /// # Errors
    /// Returns `Decode` if the bytes are not UTF-8 or the length header
    /// points past the end of the buffer.
    pub fn decode(self, buffer: &[u8]) -> Result<String> {
        let payload = match self {
            Self::NullPadded => {
                let end = buffer.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                &buffer[..end]
            }
            Self::LengthPrefixed => {
                if buffer.len() < LENGTH_PREFIX_SIZE {
                    return Ok(String::new());
                }
                let length =
                    u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
                let end = LENGTH_PREFIX_SIZE + length;
                if end > buffer.len() {
                    return Err(CourierError::decode(format!(
                        "length header {} exceeds segment of {} bytes",
                        length,
                        buffer.len()
                    )));
                }
                &buffer[LENGTH_PREFIX_SIZE..end]
            }
        };

        String::from_utf8(payload.to_vec())
            .map_err(|e| CourierError::decode(format!("segment is not valid UTF-8: {}", e)))
    }
}
