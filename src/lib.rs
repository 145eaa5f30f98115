//! Segmux - low-latency HLS segment and part assembly
//!
//! This library crate exposes configuration, the part store and the
//! synthetic source for the `segmux` binary and integration testing.

pub mod config;
pub mod store;
pub mod synthetic;

pub use segmux_media as media;
