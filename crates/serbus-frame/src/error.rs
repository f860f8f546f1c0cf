/// Errors that can occur while building a framing configuration.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The maximum frame length must be at least one byte.
    #[error("invalid maximum frame length {0} (must be at least 1)")]
    InvalidMaxLength(usize),

    /// A framing byte could not be parsed from its hex representation.
    #[error("invalid hex byte {0:?} (expected e.g. 0a or 0x0A)")]
    InvalidByte(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
