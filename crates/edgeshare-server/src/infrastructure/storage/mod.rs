//! Storage infrastructure: the server's TOML configuration file.
//!
//! The `config` sub-module handles:
//!
//! - Locating `server.toml` in the platform-appropriate directory.
//! - Reading and writing it with `serde` and `toml`.
//! - Turning the screens, links and options it describes into a validated
//!   [`Topology`](edgeshare_core::Topology).

pub mod config;
