//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the gateway's TOML file, fills in defaults
//! for anything left out, validates the result, and converts it into the
//! settings the APRS-IS client and the UDP adapters need.

pub mod config;
