//! Bridge serial devices onto an LCM publish/subscribe bus.
//!
//! Bytes read from a device are split into frames at a terminator byte and
//! published on the device's outbound channel; messages on its inbound
//! channel are written back to the device unchanged.
//!
//! # Crate Structure
//!
//! - [`serial`]: raw serial device access and readiness waiting
//! - [`frame`]: initiator/terminator framing
//! - [`bus`]: the message-bus abstraction and its LCM client
//! - [`bridge`]: the event loop tying one device to one bus

/// Re-export serial types.
pub mod serial {
    pub use serbus_serial::*;
}

/// Re-export framing types.
pub mod frame {
    pub use serbus_frame::*;
}

/// Re-export bus types.
pub mod bus {
    pub use serbus_bus::*;
}

/// Re-export bridge types.
pub mod bridge {
    pub use serbus_bridge::*;
}
