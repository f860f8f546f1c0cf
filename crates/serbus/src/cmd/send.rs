use std::fs;

use serbus_bus::channel::validate_channel;
use serbus_bus::{LcmBus, MessageBus};
use serbus_frame::{now_micros, Frame};
use tracing::info;

use crate::cmd::SendArgs;
use crate::exit::{bus_error, io_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    validate_channel(&args.channel).map_err(|err| bus_error("invalid channel", err))?;
    let payload = resolve_payload(&args)?;
    let frame = Frame::new(args.utime.unwrap_or_else(now_micros), payload);

    let mut bus = LcmBus::connect(&args.lcm_url).map_err(|err| bus_error("bus connect failed", err))?;
    bus.publish(&args.channel, &frame)
        .map_err(|err| bus_error("publish failed", err))?;

    info!(channel = %args.channel, size = frame.len(), "published message");
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return parse_hex_payload(hex)
            .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

/// Hex digit pairs, optionally separated by whitespace: `"24 50 0d0a"`.
fn parse_hex_payload(input: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| "non-ASCII input".to_string())?;
            u8::from_str_radix(text, 16).map_err(|_| format!("'{text}' is not a hex byte"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_payload_accepts_spaced_and_packed_digits() {
        assert_eq!(parse_hex_payload("24 50 0d0a").unwrap(), vec![0x24, 0x50, 0x0d, 0x0a]);
        assert_eq!(parse_hex_payload("FF").unwrap(), vec![0xff]);
        assert!(parse_hex_payload("").unwrap().is_empty());
    }

    #[test]
    fn hex_payload_rejects_bad_input() {
        assert!(parse_hex_payload("abc").is_err());
        assert!(parse_hex_payload("zz").is_err());
    }
}
