use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use serbus_bridge::OverflowPolicy;
use serbus_bus::{ChannelSuffixes, LcmUrl, DEFAULT_LCM_URL};
use serbus_frame::{parse_hex_byte, DEFAULT_MAX_FRAME_LENGTH};
use serbus_serial::BaudRate;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod bridge;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bridge a serial device onto the bus.
    Bridge(BridgeArgs),
    /// Publish a single message.
    Send(SendArgs),
    /// Print messages received on a channel.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Bridge(args) => bridge::run(args),
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Channel suffix presets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SuffixStyle {
    /// `i` / `o`
    #[default]
    Alpha,
    /// `<` / `>`
    Symbolic,
    /// `.in` / `.out`
    Dotted,
}

impl SuffixStyle {
    pub fn suffixes(self) -> ChannelSuffixes {
        match self {
            SuffixStyle::Alpha => ChannelSuffixes::alpha(),
            SuffixStyle::Symbolic => ChannelSuffixes::symbolic(),
            SuffixStyle::Dotted => ChannelSuffixes::dotted(),
        }
    }
}

#[derive(Args, Debug)]
pub struct BridgeArgs {
    /// Serial device path (e.g. /dev/ttyUSB0).
    pub device: PathBuf,
    /// Baud rate: 9600, 19200, 38400, 57600, 115200 or 230400.
    #[arg(long, short = 'b', default_value = "115200")]
    pub baud: BaudRate,
    /// Frame terminator byte, in hex.
    #[arg(long, short = 't', value_name = "HEX", default_value = "0a", value_parser = parse_hex_arg)]
    pub terminator: u8,
    /// Frame initiator byte, in hex. Defaults to the terminator.
    #[arg(long, short = 'i', value_name = "HEX", value_parser = parse_hex_arg)]
    pub initiator: Option<u8>,
    /// Keep the device's current termios settings.
    #[arg(long, short = 'p')]
    pub preserve_termios: bool,
    /// Longest frame before a partial frame is published.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_FRAME_LENGTH)]
    pub max_length: usize,
    /// Channel suffix preset.
    #[arg(long, value_enum, default_value_t = SuffixStyle::Alpha)]
    pub suffixes: SuffixStyle,
    /// Custom inbound channel suffix.
    #[arg(long, requires = "outbound_suffix", conflicts_with = "suffixes")]
    pub inbound_suffix: Option<String>,
    /// Custom outbound channel suffix.
    #[arg(long, requires = "inbound_suffix", conflicts_with = "suffixes")]
    pub outbound_suffix: Option<String>,
    /// LCM provider URL.
    #[arg(long, value_name = "URL", default_value = DEFAULT_LCM_URL)]
    pub lcm_url: LcmUrl,
    /// Wake up at least this often even when idle (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub heartbeat: Option<Duration>,
    /// How to treat frames cut at the maximum length: report or silent.
    #[arg(long, default_value = "report")]
    pub overflow: OverflowPolicy,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Channel to publish on.
    pub channel: String,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload (e.g. "24 50 0d 0a").
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Message timestamp in microseconds. Defaults to now.
    #[arg(long)]
    pub utime: Option<i64>,
    /// LCM provider URL.
    #[arg(long, value_name = "URL", default_value = DEFAULT_LCM_URL)]
    pub lcm_url: LcmUrl,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Channel to subscribe to.
    pub channel: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// LCM provider URL.
    #[arg(long, value_name = "URL", default_value = DEFAULT_LCM_URL)]
    pub lcm_url: LcmUrl,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_hex_arg(input: &str) -> Result<u8, String> {
    parse_hex_byte(input).map_err(|err| err.to_string())
}

pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;

    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Sets `shutdown` on Ctrl-C.
pub fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn suffix_styles_map_to_presets() {
        assert_eq!(SuffixStyle::Alpha.suffixes().outbound(), "o");
        assert_eq!(SuffixStyle::Symbolic.suffixes().inbound(), "<");
        assert_eq!(SuffixStyle::Dotted.suffixes().outbound(), ".out");
    }
}
