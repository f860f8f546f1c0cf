use std::fmt;
use std::str::FromStr;

/// Supported line speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    #[default]
    B115200,
    B230400,
}

impl BaudRate {
    pub const ALL: [BaudRate; 6] = [
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
        BaudRate::B230400,
    ];

    /// Bits per second.
    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
            BaudRate::B230400 => 230400,
        }
    }

    /// Look up a rate from bits per second.
    pub fn from_bits_per_second(bps: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|rate| rate.bits_per_second() == bps)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits_per_second())
    }
}

impl FromStr for BaudRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bps: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("{s} is not a baud rate"))?;
        Self::from_bits_per_second(bps).ok_or_else(|| {
            let supported: Vec<String> = Self::ALL.iter().map(ToString::to_string).collect();
            format!(
                "{bps} baud not supported (supported: {})",
                supported.join(", ")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_rates() {
        for rate in BaudRate::ALL {
            let parsed: BaudRate = rate.to_string().parse().unwrap();
            assert_eq!(parsed, rate);
        }
    }

    #[test]
    fn rejects_unsupported_rate() {
        let err = "4800".parse::<BaudRate>().unwrap_err();
        assert!(err.contains("not supported"));
        assert!("fast".parse::<BaudRate>().is_err());
    }

    #[test]
    fn default_is_115200() {
        assert_eq!(BaudRate::default().bits_per_second(), 115200);
    }
}
