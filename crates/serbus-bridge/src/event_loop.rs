use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serbus_bus::MessageBus;
use serbus_frame::{now_micros, Frame, FrameDecoder};
use serbus_serial::{wait, Readiness, SerialChannel, SerialError, WaitOutcome, Waitable};
use tracing::{debug, info, trace};

use crate::config::{BridgeConfig, OverflowPolicy};
use crate::error::{BridgeError, Result};

/// Longest `run` blocks before rechecking the shutdown flag.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub bytes_read: usize,
    pub frames_published: usize,
    /// Frames among `frames_published` that were cut at the length limit.
    pub overflow_frames: usize,
    pub messages_written: usize,
    pub timed_out: bool,
}

impl CycleReport {
    fn accumulate(&mut self, other: CycleReport) {
        self.bytes_read += other.bytes_read;
        self.frames_published += other.frames_published;
        self.overflow_frames += other.overflow_frames;
        self.messages_written += other.messages_written;
    }
}

/// Bridges one serial device and one message bus.
///
/// Each cycle waits for either source, services the device first (frame and
/// publish everything read), then the bus (write every pending inbound
/// message to the device).
pub struct EventLoop<B: MessageBus> {
    serial: SerialChannel,
    bus: B,
    decoder: FrameDecoder,
    config: BridgeConfig,
}

impl<B: MessageBus> EventLoop<B> {
    /// Subscribe to the inbound channel and take ownership of both endpoints.
    pub fn new(serial: SerialChannel, mut bus: B, config: BridgeConfig) -> Result<Self> {
        bus.subscribe(config.binding.inbound())?;
        info!(
            device = serial.name(),
            inbound = config.binding.inbound(),
            outbound = config.binding.outbound(),
            initiator = format_args!("{:#04x}", config.framing.initiator()),
            terminator = format_args!("{:#04x}", config.framing.terminator()),
            max_frame_length = config.framing.max_frame_length(),
            "bridge ready"
        );
        Ok(Self {
            decoder: FrameDecoder::new(config.framing),
            serial,
            bus,
            config,
        })
    }

    /// Run a single wait-and-service cycle. Interrupted waits are retried.
    pub fn run_once(&mut self) -> Result<CycleReport> {
        loop {
            if let Some(report) = self.cycle(self.config.heartbeat)? {
                return Ok(report);
            }
        }
    }

    /// Run cycles until `shutdown` is set or an error occurs.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let timeout = self
            .config
            .heartbeat
            .map_or(SHUTDOWN_CHECK_INTERVAL, |h| h.min(SHUTDOWN_CHECK_INTERVAL));

        let mut totals = CycleReport::default();
        while !shutdown.load(Ordering::SeqCst) {
            match self.cycle(Some(timeout))? {
                Some(report) => totals.accumulate(report),
                None => trace!("wait interrupted"),
            }
        }

        info!(
            bytes_read = totals.bytes_read,
            frames_published = totals.frames_published,
            overflow_frames = totals.overflow_frames,
            messages_written = totals.messages_written,
            "bridge stopped"
        );
        Ok(())
    }

    /// Release the device and the bus.
    pub fn into_parts(self) -> (SerialChannel, B) {
        (self.serial, self.bus)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// `Ok(None)` when the wait was interrupted by a signal.
    fn cycle(&mut self, timeout: Option<Duration>) -> Result<Option<CycleReport>> {
        let sources: [&dyn Waitable; 2] = [&self.serial, &self.bus];
        let ready = match wait(&sources, timeout) {
            Ok(WaitOutcome::Ready(ready)) => ready,
            Ok(WaitOutcome::TimedOut) => {
                trace!("poll timed out");
                return Ok(Some(CycleReport {
                    timed_out: true,
                    ..CycleReport::default()
                }));
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(None),
            Err(err) => return Err(BridgeError::Wait(err)),
        };

        let serial_ready = ready.first().copied().unwrap_or_default();
        let bus_ready = ready.get(1).copied().unwrap_or_default();

        let mut report = CycleReport::default();
        if serial_ready.is_ready() {
            self.service_serial(serial_ready, &mut report)?;
        }
        if bus_ready.is_ready() {
            self.service_bus(&mut report)?;
        }
        Ok(Some(report))
    }

    fn service_serial(&mut self, readiness: Readiness, report: &mut CycleReport) -> Result<()> {
        let data = self.serial.read_available()?;
        if data.is_empty() {
            if readiness.hangup {
                return Err(SerialError::Disconnected(self.serial.name().to_string()).into());
            }
            return Ok(());
        }

        report.bytes_read += data.len();
        let utime = now_micros();
        for frame in self.decoder.feed_slice(&data, utime) {
            self.publish(frame, report)?;
        }
        Ok(())
    }

    fn publish(&mut self, frame: Frame, report: &mut CycleReport) -> Result<()> {
        let channel = self.config.binding.outbound();
        if frame.is_overflow() {
            report.overflow_frames += 1;
            if self.config.overflow == OverflowPolicy::Report {
                debug!(
                    channel,
                    length = frame.len(),
                    "frame reached maximum length, publishing partial frame"
                );
            }
        }

        self.bus.publish(channel, &frame)?;
        report.frames_published += 1;
        trace!(channel, length = frame.len(), utime = frame.utime, "published frame");
        Ok(())
    }

    fn service_bus(&mut self, report: &mut CycleReport) -> Result<()> {
        let serial = &mut self.serial;
        let written = self.bus.dispatch_pending(|channel, frame| {
            trace!(channel, length = frame.len(), "writing inbound message to device");
            serial.write(&frame.payload).map_err(BridgeError::from)
        })?;
        report.messages_written += written;
        Ok(())
    }
}

impl<B: MessageBus + std::fmt::Debug> std::fmt::Debug for EventLoop<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("serial", &self.serial)
            .field("bus", &self.bus)
            .field("config", &self.config)
            .finish()
    }
}
