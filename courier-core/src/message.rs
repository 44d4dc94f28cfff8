//! Text conversion contract for payloads crossing process boundaries.

use crate::error::{CourierError, Result};
use std::fmt::Display;
use std::str::FromStr;

/// A message that can be carried as UTF-8 text.
///
/// Implemented for every type that is both [`Display`] and [`FromStr`], which
/// covers `String`, the numeric primitives and most domain identifiers.
pub trait TextMessage: Sized {
    /// Encodes the message as text.
    fn to_text(&self) -> String;

    /// Decodes a message from text.
    ///
    /// # Errors
    /// Returns `Decode` if the text is not a valid encoding of `Self`.
    fn from_text(text: &str) -> Result<Self>;
}

impl<T> TextMessage for T
where
    T: Display + FromStr,
    T::Err: Display,
{
    fn to_text(&self) -> String {
        self.to_string()
    }

    fn from_text(text: &str) -> Result<Self> {
        text.parse::<T>().map_err(|e| {
            CourierError::decode(format!(
                "cannot convert {:?} into {}: {}",
                text,
                std::any::type_name::<T>(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct OrderId(u32);

    impl Display for OrderId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "ORD-{}", self.0)
        }
    }

    impl FromStr for OrderId {
        type Err = String;

        fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
            s.strip_prefix("ORD-")
                .and_then(|n| n.parse().ok())
                .map(OrderId)
                .ok_or_else(|| format!("not an order id: {}", s))
        }
    }

    #[test]
    fn test_string_passthrough() {
        let text = "ping".to_string().to_text();
        assert_eq!(String::from_text(&text).unwrap(), "ping");
    }

    #[test]
    fn test_numeric_parse() {
        assert_eq!(i64::from_text("-42").unwrap(), -42);
        assert!(matches!(
            u8::from_text("300"),
            Err(CourierError::Decode { .. })
        ));
    }

    #[test]
    fn test_domain_type() {
        assert_eq!(OrderId(17).to_text(), "ORD-17");
        assert_eq!(OrderId::from_text("ORD-17").unwrap(), OrderId(17));

        let err = OrderId::from_text("17").unwrap_err();
        assert!(err.to_string().contains("not an order id"));
    }
}
