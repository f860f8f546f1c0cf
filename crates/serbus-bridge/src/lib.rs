//! The serbus bridge: one serial device, one message bus, one loop.
//!
//! [`EventLoop`] waits on both sources, frames device output and publishes it
//! on the outbound channel, then writes every inbound message to the device
//! verbatim. It runs on the caller's thread and owns both endpoints.

pub mod config;
pub mod error;
pub mod event_loop;

pub use config::{BridgeConfig, OverflowPolicy};
pub use error::{BridgeError, Result};
pub use event_loop::{CycleReport, EventLoop};
