//! Infrastructure layer for the gateway.
//!
//! Contains OS-facing adapters: the APRS-IS TCP client, the local UDP frame
//! source and line forwarder, the TOML configuration loader, and the
//! `tracing` subscriber setup.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `aprs_core`, but MUST NOT be imported by the `application` layer.

pub mod local;
pub mod logging;
pub mod network;
pub mod storage;
