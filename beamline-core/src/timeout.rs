//! Timeout values for blocking send and receive operations.
//!
//! Every blocking operation in the facade takes a [`Timeout`]: a millisecond
//! deadline with two sentinel values. [`Timeout::NO_BLOCK`] makes the call
//! return immediately, [`Timeout::BLOCK`] waits indefinitely.

use std::time::Duration;

/// Millisecond deadline for a blocking send or receive.
///
/// Timeouts are 64-bit signed milliseconds. Negative inputs are clamped to
/// zero on construction, so every `Timeout` value is non-negative.
///
/// # Examples
///
/// ```
/// use beamline_core::Timeout;
///
/// let t = Timeout::from_millis(10);
/// assert_eq!(t.as_millis(), 10);
/// assert!(!t.is_no_block());
/// assert!(!t.is_block());
///
/// assert!(Timeout::NO_BLOCK.is_no_block());
/// assert!(Timeout::BLOCK.is_block());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timeout {
    millis: i64,
}

impl Timeout {
    /// Return immediately: succeed only if the operation can complete now.
    pub const NO_BLOCK: Timeout = Timeout { millis: 0 };

    /// Wait indefinitely.
    pub const BLOCK: Timeout = Timeout { millis: i64::MAX };

    /// Create a timeout from a millisecond count. Negative values clamp to 0.
    pub const fn from_millis(millis: i64) -> Self {
        Self {
            millis: if millis < 0 { 0 } else { millis },
        }
    }

    /// The deadline in milliseconds.
    pub const fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Whether this is the non-blocking sentinel.
    pub const fn is_no_block(&self) -> bool {
        self.millis == 0
    }

    /// Whether this is the block-indefinitely sentinel.
    pub const fn is_block(&self) -> bool {
        self.millis == i64::MAX
    }

    /// The deadline as a [`Duration`].
    ///
    /// Callers dispatching on the sentinels should branch on
    /// [`is_no_block`](Self::is_no_block) / [`is_block`](Self::is_block)
    /// first; the sentinel values convert like any other count.
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis as u64)
    }
}

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Self {
        let millis = value.as_millis();
        Self::from_millis(if millis > i64::MAX as u128 {
            i64::MAX
        } else {
            millis as i64
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert_eq!(Timeout::NO_BLOCK.as_millis(), 0);
        assert_eq!(Timeout::BLOCK.as_millis(), i64::MAX);
        assert!(Timeout::NO_BLOCK.is_no_block());
        assert!(!Timeout::NO_BLOCK.is_block());
        assert!(Timeout::BLOCK.is_block());
        assert!(!Timeout::BLOCK.is_no_block());
    }

    #[test]
    fn test_negative_clamps_to_zero() {
        let t = Timeout::from_millis(-42);
        assert_eq!(t.as_millis(), 0);
        assert!(t.is_no_block());
    }

    #[test]
    fn test_duration_roundtrip() {
        let t = Timeout::from(Duration::from_millis(250));
        assert_eq!(t.as_millis(), 250);
        assert_eq!(t.as_duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_oversized_duration_saturates() {
        let t = Timeout::from(Duration::from_secs(u64::MAX));
        assert!(t.is_block());
    }
}
