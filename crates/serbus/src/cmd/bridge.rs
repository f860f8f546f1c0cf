use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serbus_bridge::{BridgeConfig, EventLoop};
use serbus_bus::{ChannelBinding, ChannelSuffixes, LcmBus};
use serbus_frame::FramingConfig;
use serbus_serial::{SerialChannel, SerialConfig};

use crate::cmd::{install_ctrlc_handler, BridgeArgs};
use crate::exit::{bridge_error, bus_error, frame_error, serial_error, CliResult, SUCCESS};

pub fn run(args: BridgeArgs) -> CliResult<i32> {
    let config = bridge_config(&args)?;

    let serial_config = SerialConfig {
        baud_rate: args.baud,
        preserve_termios: args.preserve_termios,
    };
    let serial = SerialChannel::open(&args.device, &serial_config)
        .map_err(|err| serial_error("open failed", err))?;

    let bus = LcmBus::connect(&args.lcm_url).map_err(|err| bus_error("bus connect failed", err))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(shutdown.clone())?;

    let mut bridge = EventLoop::new(serial, bus, config)
        .map_err(|err| bridge_error("bridge setup failed", err))?;
    bridge
        .run(&shutdown)
        .map_err(|err| bridge_error("bridge failed", err))?;

    Ok(SUCCESS)
}

/// Everything that can be validated before touching the device.
fn bridge_config(args: &BridgeArgs) -> CliResult<BridgeConfig> {
    let initiator = args.initiator.unwrap_or(args.terminator);
    let framing = FramingConfig::new(initiator, args.terminator, args.max_length)
        .map_err(|err| frame_error("invalid framing", err))?;

    let suffixes = match (&args.inbound_suffix, &args.outbound_suffix) {
        (Some(inbound), Some(outbound)) => ChannelSuffixes::new(inbound.as_str(), outbound.as_str())
            .map_err(|err| bus_error("invalid suffixes", err))?,
        _ => args.suffixes.suffixes(),
    };
    let binding = ChannelBinding::for_device(&args.device, &suffixes)
        .map_err(|err| bus_error("invalid channel", err))?;

    Ok(BridgeConfig::new(binding)
        .with_framing(framing)
        .with_heartbeat(args.heartbeat)
        .with_overflow(args.overflow))
}
