//! # aprs-core
//!
//! Shared library for the APRS gateway containing the outbound frame queue,
//! the tick-driven reconnect scheduler, and the APRS-IS line protocol helpers.
//!
//! This crate has zero dependencies on sockets, async runtimes, or the file
//! system.  Everything in it can be driven from a unit test with synthetic
//! inputs and a synthetic clock.
//!
//! # Architecture overview (for beginners)
//!
//! The gateway takes position reports ("frames") produced on the local
//! machine and forwards them to APRS-IS, a line-oriented TCP service that
//! aggregates reports from the amateur radio network.  The pieces that do not
//! touch the network live here:
//!
//! - **`queue`** – A bounded queue of discrete frames.  Its capacity is a
//!   *byte* budget, not a frame count, so many small frames or a few large
//!   ones fit in the same space.  A full queue rejects new frames instead of
//!   blocking the producer.
//!
//! - **`timer`** – A countdown timer advanced by explicit `clock(ms)` ticks
//!   and the reconnect scheduler built on top of it.  After each failed
//!   connection attempt the delay grows by one minute, up to ten minutes.
//!
//! - **`protocol`** – Login line composition, callsign normalisation, line
//!   trimming, comment detection, and the hex dump used by debug logging.

pub mod protocol;
pub mod queue;
pub mod timer;

// Re-export the most-used types at the crate root so callers can write
// `aprs_core::FrameQueue` instead of `aprs_core::queue::FrameQueue`.
pub use protocol::login::{Credentials, CredentialsError, LoginRequest};
pub use queue::{Frame, FrameQueue, QueueError, MAX_FRAME_SIZE};
pub use timer::{ReconnectScheduler, TickTimer};
