use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::{FrameError, Result};

/// Default maximum frame length in bytes.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 4096;

/// Default terminator (and initiator): line feed.
pub const DEFAULT_TERMINATOR: u8 = 0x0a;

/// How a frame was closed by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    /// The last payload byte is the terminator.
    Terminator,
    /// The buffer hit the maximum frame length before a terminator arrived.
    Overflow,
}

/// A framed chunk of the serial byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Capture time of the first payload byte, in microseconds since the Unix epoch.
    pub utime: i64,
    /// The frame bytes, framing bytes included.
    pub payload: Bytes,
    /// How the frame ended.
    pub end: FrameEnd,
}

impl Frame {
    /// Create a terminator-closed frame (the shape of frames arriving from the bus).
    pub fn new(utime: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            utime,
            payload: payload.into(),
            end: FrameEnd::Terminator,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether this frame was a forced partial emission.
    pub fn is_overflow(&self) -> bool {
        self.end == FrameEnd::Overflow
    }
}

/// Framing parameters, fixed for the lifetime of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingConfig {
    initiator: u8,
    terminator: u8,
    max_frame_length: usize,
}

impl FramingConfig {
    /// Build a configuration, rejecting a zero maximum length.
    pub fn new(initiator: u8, terminator: u8, max_frame_length: usize) -> Result<Self> {
        if max_frame_length == 0 {
            return Err(FrameError::InvalidMaxLength(max_frame_length));
        }
        Ok(Self {
            initiator,
            terminator,
            max_frame_length,
        })
    }

    /// Delimiter-only framing: every byte belongs to some frame.
    pub fn delimited(terminator: u8, max_frame_length: usize) -> Result<Self> {
        Self::new(terminator, terminator, max_frame_length)
    }

    pub fn initiator(&self) -> u8 {
        self.initiator
    }

    pub fn terminator(&self) -> u8 {
        self.terminator
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// True when frames must start with a distinct initiator byte.
    pub fn seeks_initiator(&self) -> bool {
        self.initiator != self.terminator
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            initiator: DEFAULT_TERMINATOR,
            terminator: DEFAULT_TERMINATOR,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Parse a framing byte written in hex (`0a`, `0x0A`, `A`).
pub fn parse_hex_byte(text: &str) -> Result<u8> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || digits.len() > 2 {
        return Err(FrameError::InvalidByte(text.to_string()));
    }
    u8::from_str_radix(digits, 16).map_err(|_| FrameError::InvalidByte(text.to_string()))
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_length_rejected() {
        let err = FramingConfig::new(0x02, 0x0a, 0).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMaxLength(0)));
    }

    #[test]
    fn default_config_is_line_delimited() {
        let cfg = FramingConfig::default();
        assert_eq!(cfg.initiator(), 0x0a);
        assert_eq!(cfg.terminator(), 0x0a);
        assert_eq!(cfg.max_frame_length(), DEFAULT_MAX_FRAME_LENGTH);
        assert!(!cfg.seeks_initiator());
    }

    #[test]
    fn distinct_initiator_seeks() {
        let cfg = FramingConfig::new(0x02, 0x03, 16).unwrap();
        assert!(cfg.seeks_initiator());
    }

    #[test]
    fn hex_byte_forms() {
        assert_eq!(parse_hex_byte("0a").unwrap(), 0x0a);
        assert_eq!(parse_hex_byte("0x0A").unwrap(), 0x0a);
        assert_eq!(parse_hex_byte("0XfF").unwrap(), 0xff);
        assert_eq!(parse_hex_byte("2").unwrap(), 0x02);
        assert_eq!(parse_hex_byte(" 7e ").unwrap(), 0x7e);
    }

    #[test]
    fn hex_byte_rejects_garbage() {
        for bad in ["", "0x", "zz", "100", "0x1ff", "-1"] {
            assert!(
                matches!(parse_hex_byte(bad), Err(FrameError::InvalidByte(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn frame_accessors() {
        let frame = Frame::new(42, &b"ab\n"[..]);
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
        assert!(!frame.is_overflow());
        assert_eq!(frame.utime, 42);
    }

    #[test]
    fn clock_is_after_epoch() {
        assert!(now_micros() > 0);
    }
}
