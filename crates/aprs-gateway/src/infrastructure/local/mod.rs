//! Local-side adapters: where outbound frames come from and where inbound
//! APRS-IS lines go.
//!
//! # Sub-modules
//!
//! - **`udp`** – [`udp::UdpFrameSource`] receives one frame per UDP datagram
//!   from local software (a modem, a digipeater, a script).
//!   [`udp::UdpLineForwarder`] sends every inbound APRS-IS line back out as
//!   one datagram.
//!
//! - **`mock`** – A scripted [`FrameSource`] for tests.

pub mod mock;
pub mod udp;

pub use crate::application::relay::{FrameSource, SourceError};
