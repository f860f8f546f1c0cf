use std::path::PathBuf;

/// Errors that can occur on a serial device.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    /// The device special file could not be opened.
    #[error("could not open device {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The device could not be configured (termios, unsupported baud rate).
    #[error("could not configure device {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// A read from the device failed.
    #[error("device read error: {0}")]
    Read(std::io::Error),

    /// A write to the device failed.
    #[error("device write error: {0}")]
    Write(std::io::Error),

    /// The device hung up (unplugged or closed by the peer).
    #[error("device {0} disconnected")]
    Disconnected(String),

    /// Waiting for readiness failed.
    #[error("readiness wait failed: {0}")]
    Wait(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
