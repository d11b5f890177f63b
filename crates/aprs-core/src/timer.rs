//! Tick-driven timers and the reconnect backoff schedule.
//!
//! # Why not `tokio::time::sleep`? (for beginners)
//!
//! The reconnect delay is measured in minutes, so sub-second precision does
//! not matter.  What does matter is that the connection logic can be tested
//! without waiting ten real minutes.  [`TickTimer`] therefore never looks at a
//! wall clock: it only moves when somebody calls [`TickTimer::clock`] with the
//! number of milliseconds that have passed.  Tests pass in large synthetic
//! values; production code passes the measured loop period.
//!
//! An expired timer does nothing on its own.  The owner polls
//! [`TickTimer::has_expired`], stops the timer, and acts.  There are no
//! callbacks and therefore no re-entrancy.

use std::time::Duration;

use tracing::info;

/// Delay added per failed attempt.
pub const RECONNECT_STEP: Duration = Duration::from_secs(60);

/// Attempt count at which the delay stops growing.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// A countdown timer advanced only by explicit clock ticks.
///
/// The timer is either stopped, or running with a remaining duration.  A
/// running timer whose remaining duration reached zero is *expired*.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickTimer {
    timeout_ms: u64,
    remaining_ms: u64,
    running: bool,
}

impl TickTimer {
    /// Creates a stopped timer with no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the duration used by the next [`start`](Self::start).
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout_ms = duration_to_ms(timeout);
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Starts (or restarts) the countdown from the configured timeout.
    pub fn start(&mut self) {
        self.remaining_ms = self.timeout_ms;
        self.running = true;
    }

    /// Stops the countdown.  A stopped timer never reports expiry.
    pub fn stop(&mut self) {
        self.running = false;
        self.remaining_ms = 0;
    }

    /// Advances a running timer by `elapsed_ms`.  No-op when stopped.
    pub fn clock(&mut self, elapsed_ms: u64) {
        if self.running {
            self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);
        }
    }

    /// Returns `true` while the timer is running (expired or not).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Returns `true` once a running timer has counted down to zero.
    pub fn has_expired(&self) -> bool {
        self.running && self.remaining_ms == 0
    }

    /// Time left before expiry; zero when stopped or expired.
    pub fn remaining(&self) -> Duration {
        if self.running {
            Duration::from_millis(self.remaining_ms)
        } else {
            Duration::ZERO
        }
    }
}

/// Linear, capped reconnect backoff on top of a [`TickTimer`].
///
/// | Attempt | Delay      |
/// |---------|------------|
/// | 1       | 1 minute   |
/// | 2       | 2 minutes  |
/// | …       | …          |
/// | 10+     | 10 minutes |
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use aprs_core::ReconnectScheduler;
///
/// let mut scheduler = ReconnectScheduler::new();
/// assert_eq!(scheduler.start_reconnection_timer(), Duration::from_secs(60));
/// assert_eq!(scheduler.start_reconnection_timer(), Duration::from_secs(120));
///
/// scheduler.clock(120_000);
/// assert!(scheduler.has_expired());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReconnectScheduler {
    timer: TickTimer,
    attempts: u32,
}

impl ReconnectScheduler {
    /// Creates a scheduler with no failed attempts and a stopped timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed attempt and starts the countdown to the next one.
    ///
    /// Returns the scheduled delay: `min(attempts, 10) × 60 s`.
    pub fn start_reconnection_timer(&mut self) -> Duration {
        self.attempts = (self.attempts + 1).min(MAX_RECONNECT_ATTEMPTS);

        let delay = RECONNECT_STEP * self.attempts;
        info!("will attempt to reconnect in {} minute(s)", self.attempts);

        self.timer.set_timeout(delay);
        self.timer.start();
        delay
    }

    /// Advances the countdown.
    pub fn clock(&mut self, elapsed_ms: u64) {
        self.timer.clock(elapsed_ms);
    }

    /// Returns `true` once the scheduled delay has fully elapsed.
    pub fn has_expired(&self) -> bool {
        self.timer.has_expired()
    }

    /// Returns `true` while a reconnect is scheduled.
    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Stops the countdown without touching the attempt counter.
    pub fn stop(&mut self) {
        self.timer.stop();
    }

    /// Clears the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.timer.stop();
    }

    /// Consecutive failed attempts, capped at [`MAX_RECONNECT_ATTEMPTS`].
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay of the most recently scheduled reconnect.
    pub fn current_delay(&self) -> Duration {
        self.timer.timeout()
    }

    /// Time left before the next attempt.
    pub fn remaining(&self) -> Duration {
        self.timer.remaining()
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
