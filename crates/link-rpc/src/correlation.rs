//! Correlation ids.
//!
//! Ids only need to be unique among calls that are still pending, so a
//! wrapping 32-bit counter is enough. The counter starts at a random point
//! below 2^31 so two processes talking to the same remote side are unlikely
//! to collide on a shared response topic.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Highest starting point for the id counter (exclusive).
const RANDOM_START_LIMIT: u32 = 2_147_483_647;

/// Correlation id carried in `header.identity.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u32);

impl CorrelationId {
    #[must_use]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CorrelationId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Monotonic, wrapping id source.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    /// Start at a random value in `0..2^31 - 1`.
    #[must_use]
    pub fn random() -> Self {
        Self::starting_at(rand::thread_rng().gen_range(0..RANDOM_START_LIMIT))
    }

    #[must_use]
    pub fn starting_at(start: u32) -> Self {
        Self {
            next: AtomicU32::new(start),
        }
    }

    /// Next candidate id. Wraps at `u32::MAX`.
    pub fn next_candidate(&self) -> CorrelationId {
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The value the next call to `next_candidate` will return.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::random()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase_by_one() {
        let ids = IdAllocator::starting_at(41);
        assert_eq!(ids.next_candidate(), CorrelationId::new(41));
        assert_eq!(ids.next_candidate(), CorrelationId::new(42));
        assert_eq!(ids.peek(), 43);
    }

    #[test]
    fn test_ids_wrap() {
        let ids = IdAllocator::starting_at(u32::MAX);
        assert_eq!(ids.next_candidate().value(), u32::MAX);
        assert_eq!(ids.next_candidate().value(), 0);
    }

    #[test]
    fn test_random_start_below_limit() {
        for _ in 0..100 {
            assert!(IdAllocator::random().peek() < RANDOM_START_LIMIT);
        }
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&CorrelationId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
