//! RelayUseCase: move local frames to the APRS-IS uplink and keep its clock
//! running.
//!
//! # The tick (for beginners)
//!
//! The uplink's reconnect timer does not read the wall clock itself.  It is
//! advanced by explicit `clock(ms)` calls, and this loop is what makes them:
//!
//! ```text
//! loop every ~20 ms:
//!     frame = source.recv_frame(wait ≤ 20 ms)
//!     if frame: uplink.write(frame)      // false = link down or queue full
//!     uplink.clock(ms since the last clock call)
//!     sleep whatever is left of the 20 ms tick
//! ```
//!
//! Elapsed time is measured with a stopwatch that carries sub-millisecond
//! remainders forward, so the uplink's timer never drifts behind real time
//! no matter how uneven the iterations are.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Target length of one relay iteration.
pub const TICK: Duration = Duration::from_millis(20);

/// Error type for local frame source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source socket could not be bound.
    #[error("failed to bind frame source on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred while receiving a frame.
    #[error("recv error: {0}")]
    Recv(#[source] std::io::Error),
}

/// Where outbound frames come from.
///
/// The production implementation is a UDP socket; tests use a scripted mock.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits at most `wait` for the next frame.
    ///
    /// Returns `Ok(None)` when nothing usable arrived in time.
    async fn recv_frame(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, SourceError>;
}

/// Where outbound frames go.
pub trait Uplink: Send + Sync {
    /// Offers one frame.  `false` means it was not accepted.
    fn write(&self, frame: &[u8]) -> bool;
    /// Advances the uplink's reconnect timer.
    fn clock(&self, elapsed_ms: u64);
}

/// Counters reported when the relay stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Frames read from the source.
    pub received: u64,
    /// Frames the uplink accepted.
    pub forwarded: u64,
    /// Frames the uplink refused.
    pub refused: u64,
    /// Source errors logged and skipped.
    pub source_errors: u64,
}

/// Measures whole milliseconds between laps without losing the fraction.
struct Stopwatch {
    last: Instant,
}

impl Stopwatch {
    fn start() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    fn lap_ms(&mut self) -> u64 {
        let ms = u64::try_from(self.last.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last += Duration::from_millis(ms);
        ms
    }
}

/// Runs the relay until `running` is cleared.
///
/// Source errors are logged and the loop carries on.  The caller owns the
/// uplink's lifecycle and stops it after this returns.
pub async fn run_relay<S, U>(source: &mut S, uplink: &U, running: &AtomicBool) -> RelayStats
where
    S: FrameSource + ?Sized,
    U: Uplink + ?Sized,
{
    let mut stats = RelayStats::default();
    let mut stopwatch = Stopwatch::start();
    info!("relay started");

    while running.load(Ordering::Acquire) {
        let tick_start = Instant::now();

        match source.recv_frame(TICK).await {
            Ok(Some(frame)) => {
                stats.received += 1;
                if uplink.write(&frame) {
                    stats.forwarded += 1;
                } else {
                    stats.refused += 1;
                    debug!("uplink refused a {} byte frame", frame.len());
                }
            }
            Ok(None) => {}
            Err(e) => {
                stats.source_errors += 1;
                warn!("local frame source error: {e}");
            }
        }

        uplink.clock(stopwatch.lap_ms());

        if let Some(rest) = TICK.checked_sub(tick_start.elapsed()) {
            time::sleep(rest).await;
        }
    }

    info!(
        "relay stopped: {} received, {} forwarded, {} refused, {} source errors",
        stats.received, stats.forwarded, stats.refused, stats.source_errors
    );
    stats
}

// ── Tests ─────────────────────────────────────────────────────────────────────
