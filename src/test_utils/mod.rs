//! Test utilities for udpcam
//!
//! Provides synthetic image and datagram generation plus in-memory sources
//! and sinks for validating the receive pipeline without a network or a
//! camera device.

pub mod datagram_generator;
pub mod recording_sink;
pub mod scripted_source;

pub use datagram_generator::*;
pub use recording_sink::*;
pub use scripted_source::*;
