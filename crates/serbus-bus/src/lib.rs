//! Publish/subscribe bus access for the serbus bridge.
//!
//! The bridge only needs the [`MessageBus`] trait: subscribe, publish, a
//! readiness handle, and "dispatch everything pending". [`LcmBus`] implements
//! it over the LCM UDP-multicast protocol, carrying frames as `raw_bytes_t`
//! messages.
//!
//! [`ChannelBinding`] derives the inbound/outbound channel pair for a device.

pub mod channel;
pub mod error;
pub mod lcm;
pub mod packet;
pub mod raw_bytes;
pub mod traits;
pub mod url;

pub use channel::{ChannelBinding, ChannelSuffixes, MAX_CHANNEL_LENGTH};
pub use error::{BusError, Result};
pub use lcm::LcmBus;
pub use raw_bytes::RAW_BYTES_FINGERPRINT;
pub use traits::MessageBus;
pub use url::{LcmUrl, DEFAULT_LCM_URL};
