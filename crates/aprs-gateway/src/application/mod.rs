//! Application layer use cases for the gateway.
//!
//! # What is the "application" layer? (for beginners)
//!
//! This layer wires the pieces together without knowing how they are
//! implemented.  The relay below reads frames from "a frame source" and hands
//! them to "an uplink"; it never sees a socket.  The infrastructure layer
//! provides the real UDP source and APRS-IS client, and tests provide fakes.
//!
//! # Sub-modules
//!
//! - **`relay`** – The driving loop: one local frame in, one `write()` out,
//!   then advance the uplink's reconnect clock and sleep out the 20 ms tick.

pub mod relay;
