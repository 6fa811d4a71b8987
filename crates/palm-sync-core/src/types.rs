//! Strong type definitions shared by every layer.

use std::fmt;

/// Single-byte transaction identifier correlating a request with its
/// response and with per-fragment acknowledgments.
///
/// Values 0x00, 0x01 and 0xFF are reserved for wake-up and handshake
/// traffic and are never produced by [`TransactionId::next`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u8);

impl TransactionId {
    /// Transaction id carried by wake-up packets before the first real
    /// transaction.
    pub const WAKEUP: Self = Self(0xFF);

    /// Starting point of a fresh counter. The first call to `next` yields 0x02.
    pub const INITIAL: Self = Self(0x01);

    /// Whether this value is reserved for handshakes.
    pub const fn is_reserved(self) -> bool {
        matches!(self.0, 0x00 | 0x01 | 0xFF)
    }

    /// The following non-reserved value.
    pub const fn next(self) -> Self {
        let mut value = self.0.wrapping_add(1);
        while matches!(value, 0x00 | 0x01 | 0xFF) {
            value = value.wrapping_add(1);
        }
        Self(value)
    }

    /// Raw byte.
    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({:#04x})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

impl From<u8> for TransactionId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// Monotonic transaction id source owned by one connection.
#[derive(Debug, Default)]
pub struct TransactionCounter {
    current: TransactionId,
}

impl TransactionCounter {
    /// Start a counter whose first id is 0x02.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the new id.
    pub fn bump(&mut self) -> TransactionId {
        self.current = self.current.next();
        self.current
    }

    /// Most recently issued id.
    pub fn current(&self) -> TransactionId {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_id_skips_reserved() {
        let mut counter = TransactionCounter::new();
        assert_eq!(counter.bump(), TransactionId(0x02));
        assert_eq!(counter.bump(), TransactionId(0x03));
    }

    #[test]
    fn test_wraps_past_reserved_values() {
        assert_eq!(TransactionId(0xFD).next(), TransactionId(0xFE));
        assert_eq!(TransactionId(0xFE).next(), TransactionId(0x02));
        assert_eq!(TransactionId::WAKEUP.next(), TransactionId(0x02));
    }

    #[test]
    fn test_never_yields_reserved() {
        let mut id = TransactionId::INITIAL;
        for _ in 0..1000 {
            id = id.next();
            assert!(!id.is_reserved());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(TransactionId(0x2a).to_string(), "0x2a");
        assert!(format!("{:?}", TransactionId(0xff)).starts_with("TransactionId("));
    }
}
