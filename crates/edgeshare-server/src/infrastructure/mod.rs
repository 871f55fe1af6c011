//! Infrastructure layer for the edgeshare server.
//!
//! Contains the adapters around the application core: primary-screen
//! backends, the console command source, TCP networking, and TOML storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `edgeshare_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.

pub mod console;
pub mod network;
pub mod primary;
pub mod storage;
