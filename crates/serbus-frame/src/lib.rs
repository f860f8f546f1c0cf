//! Initiator/terminator framing for byte-oriented serial devices.
//!
//! Bytes are fed one at a time into a [`FrameDecoder`], which emits a
//! [`Frame`] whenever it sees the terminator byte or its accumulation buffer
//! reaches the configured maximum length. When the initiator differs from the
//! terminator, bytes preceding an initiator are discarded.
//!
//! The decoder never blocks and never fails; every accepted byte ends up in
//! exactly one emitted frame.

pub mod codec;
pub mod decoder;
pub mod error;

pub use codec::{
    now_micros, parse_hex_byte, Frame, FrameEnd, FramingConfig, DEFAULT_MAX_FRAME_LENGTH,
    DEFAULT_TERMINATOR,
};
pub use decoder::{FrameDecoder, SearchMode};
pub use error::{FrameError, Result};
