use serbus_bus::BusError;
use serbus_serial::SerialError;

/// Errors that stop the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Serial device error.
    #[error("serial error: {0}")]
    Serial(#[from] SerialError),

    /// Message bus error.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Waiting for readiness failed for a reason other than a signal.
    #[error("readiness wait failed: {0}")]
    Wait(std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
