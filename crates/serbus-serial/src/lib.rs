//! Serial device access for the serbus bridge.
//!
//! This is the lowest layer of serbus:
//! - [`SerialChannel`] owns the device descriptor and moves raw bytes, with no
//!   protocol knowledge
//! - [`Waitable`] and [`wait`] block until one of several descriptors is ready
//!
//! Only Unix targets are supported (termios and `poll(2)`).

pub mod baud;
pub mod error;
pub mod serial;
pub mod waitable;

pub use baud::BaudRate;
pub use error::{Result, SerialError};
pub use serial::{SerialChannel, SerialConfig};
pub use waitable::{wait, wait_writable, Readiness, WaitOutcome, Waitable};
