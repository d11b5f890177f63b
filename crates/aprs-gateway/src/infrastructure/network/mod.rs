//! Network infrastructure: the APRS-IS uplink.
//!
//! # Sub-modules
//!
//! - **`aprs_is`** – The forwarding client.  Owns the TCP connection, runs
//!   the login handshake, sends queued frames one at a time, hands inbound
//!   lines to the registered sink, and reconnects with a growing delay after
//!   any failure.
//!
//! - **`line_codec`** – Splits the TCP byte stream into text lines and reads
//!   them with a timeout.  Knows nothing about APRS-IS itself.

pub mod aprs_is;
pub mod line_codec;

pub use aprs_is::{
    AprsIsClient, AprsIsConfig, ClientConfigError, HandshakeStage, LineSink, LinkError,
    LinkStatus,
};
pub use line_codec::{LineCodec, ReadOutcome};
