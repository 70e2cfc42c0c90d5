//! Time source abstraction.
//!
//! Every expiry decision in this crate (token `exp`/`nbf`, invite expiry,
//! nonce timestamps) reads the clock through [`TimeSource`], never through
//! `SystemTime` directly, so tests can pin and advance time explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over the current time.
pub trait TimeSource: Send + Sync {
    /// Get the current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;

    /// Get the current time in whole seconds since Unix epoch.
    fn now_secs(&self) -> u64 {
        self.now_ms() / 1000
    }
}

/// Real time source using the system clock.
///
/// This is the implementation used by the server binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[allow(clippy::cast_possible_truncation)] // Milliseconds won't overflow u64 for billions of years
    fn now_ms(&self) -> u64 {
        // duration_since(UNIX_EPOCH) only fails if system time is before 1970.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A manually driven time source.
///
/// Time only moves when told to. Unlike a `Cell`-based clock this one is
/// `Sync`, so it can be shared with services running on a multi-threaded
/// runtime.
///
/// # Example
///
/// ```
/// use identity::time::{ManualTimeSource, TimeSource};
///
/// let time = ManualTimeSource::new(1000);
/// time.advance(100);
/// assert_eq!(time.now_ms(), 1100);
/// ```
#[derive(Debug)]
pub struct ManualTimeSource {
    /// Current time in milliseconds since Unix epoch.
    current_time_ms: AtomicU64,
}

impl ManualTimeSource {
    /// Create a time source frozen at `initial_time_ms`.
    #[must_use]
    pub const fn new(initial_time_ms: u64) -> Self {
        Self {
            current_time_ms: AtomicU64::new(initial_time_ms),
        }
    }

    /// Create a time source starting at `1_700_000_000_000` (November 2023).
    #[must_use]
    pub const fn default_start() -> Self {
        Self::new(1_700_000_000_000)
    }

    /// Advance time by `ms` milliseconds, saturating at `u64::MAX`.
    pub fn advance(&self, ms: u64) {
        let _ = self
            .current_time_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(ms))
            });
    }

    /// Set the current time. May move time backwards.
    pub fn set(&self, time_ms: u64) {
        self.current_time_ms.store(time_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> u64 {
        self.current_time_ms.load(Ordering::SeqCst)
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::default_start()
    }
}
