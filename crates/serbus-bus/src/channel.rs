//! Channel naming for a bridged device.
//!
//! A device's channels are its base name plus a suffix: inbound carries bus
//! traffic to the device, outbound carries framed device output to the bus.

use std::path::Path;

use crate::error::{BusError, Result};

/// Longest channel name the bus accepts, in bytes.
pub const MAX_CHANNEL_LENGTH: usize = 63;

/// The (inbound, outbound) suffix pair appended to a device's base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSuffixes {
    inbound: String,
    outbound: String,
}

impl ChannelSuffixes {
    /// Custom suffixes. They must differ, or the bridge would hear itself.
    pub fn new(inbound: impl Into<String>, outbound: impl Into<String>) -> Result<Self> {
        let inbound = inbound.into();
        let outbound = outbound.into();
        if inbound == outbound {
            return Err(BusError::InvalidChannel {
                name: inbound,
                reason: "inbound and outbound suffixes must differ".to_string(),
            });
        }
        Ok(Self { inbound, outbound })
    }

    /// `ttyUSB0i` / `ttyUSB0o`.
    pub fn alpha() -> Self {
        Self {
            inbound: "i".to_string(),
            outbound: "o".to_string(),
        }
    }

    /// `ttyUSB0<` / `ttyUSB0>`.
    pub fn symbolic() -> Self {
        Self {
            inbound: "<".to_string(),
            outbound: ">".to_string(),
        }
    }

    /// `ttyUSB0.in` / `ttyUSB0.out`.
    pub fn dotted() -> Self {
        Self {
            inbound: ".in".to_string(),
            outbound: ".out".to_string(),
        }
    }

    pub fn inbound(&self) -> &str {
        &self.inbound
    }

    pub fn outbound(&self) -> &str {
        &self.outbound
    }
}

impl Default for ChannelSuffixes {
    fn default() -> Self {
        Self::alpha()
    }
}

/// Inbound and outbound channel names for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    inbound: String,
    outbound: String,
}

impl ChannelBinding {
    /// Explicit channel names.
    pub fn new(inbound: impl Into<String>, outbound: impl Into<String>) -> Result<Self> {
        let inbound = inbound.into();
        let outbound = outbound.into();
        validate_channel(&inbound)?;
        validate_channel(&outbound)?;
        if inbound == outbound {
            return Err(BusError::InvalidChannel {
                name: inbound,
                reason: "inbound and outbound channels must differ".to_string(),
            });
        }
        Ok(Self { inbound, outbound })
    }

    /// Derive the binding from a device path: `/dev/ttyUSB0` + (`i`, `o`)
    /// gives (`ttyUSB0i`, `ttyUSB0o`).
    pub fn for_device(device: impl AsRef<Path>, suffixes: &ChannelSuffixes) -> Result<Self> {
        let base = device_base_name(device.as_ref())?;
        Self::new(
            format!("{base}{}", suffixes.inbound()),
            format!("{base}{}", suffixes.outbound()),
        )
    }

    /// Channel whose messages are written to the device.
    pub fn inbound(&self) -> &str {
        &self.inbound
    }

    /// Channel that device frames are published on.
    pub fn outbound(&self) -> &str {
        &self.outbound
    }
}

/// Final path component of a device path.
pub fn device_base_name(device: &Path) -> Result<String> {
    device
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BusError::InvalidChannel {
            name: device.display().to_string(),
            reason: "device path has no usable base name".to_string(),
        })
}

/// Check a channel name against the bus limits.
pub fn validate_channel(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.len() > MAX_CHANNEL_LENGTH {
        "longer than 63 bytes"
    } else if name.contains('\0') {
        "contains NUL"
    } else {
        return Ok(());
    };
    Err(BusError::InvalidChannel {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}
