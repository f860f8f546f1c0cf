/// Errors that can occur in bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Failed to set up the bus sockets.
    #[error("failed to connect to bus {url}: {source}")]
    Connect {
        url: String,
        source: std::io::Error,
    },

    /// The provider URL could not be parsed.
    #[error("invalid bus url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A channel name is empty, too long, or otherwise unusable.
    #[error("invalid channel name {name:?}: {reason}")]
    InvalidChannel { name: String, reason: String },

    /// Sending a message failed.
    #[error("publish on {channel} failed: {source}")]
    Publish {
        channel: String,
        source: std::io::Error,
    },

    /// Receiving pending messages failed.
    #[error("dispatch failed: {0}")]
    Dispatch(std::io::Error),

    /// A received packet or message body was malformed.
    #[error("malformed message: {0}")]
    Decode(String),

    /// The message cannot be represented on the wire.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, BusError>;
