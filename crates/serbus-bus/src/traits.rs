use serbus_frame::Frame;
use serbus_serial::Waitable;

use crate::error::{BusError, Result};

/// A publish/subscribe client the bridge can drive from a single thread.
///
/// The readiness handle (via [`Waitable`]) becomes readable when inbound
/// messages are queued.
pub trait MessageBus: Waitable {
    /// Register interest in `channel`; later dispatches deliver its messages.
    fn subscribe(&mut self, channel: &str) -> Result<()>;

    /// Publish one frame on `channel`.
    fn publish(&mut self, channel: &str, frame: &Frame) -> Result<()>;

    /// Deliver every currently queued inbound message on subscribed channels
    /// to `on_message`, in arrival order, before returning.
    ///
    /// An implementation may stop after a bounded batch; whatever is left
    /// keeps the bus ready and goes out on the next call.
    ///
    /// Returns the number of messages delivered. An error from `on_message`
    /// stops dispatch and is returned as-is.
    fn dispatch_pending<F, E>(&mut self, on_message: F) -> std::result::Result<usize, E>
    where
        F: FnMut(&str, Frame) -> std::result::Result<(), E>,
        E: From<BusError>;
}
