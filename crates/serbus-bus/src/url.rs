use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use tracing::warn;

use crate::error::BusError;

/// Provider URL used when none is given.
pub const DEFAULT_LCM_URL: &str = "udpm://239.255.76.67:7667?ttl=0";

const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 76, 67);
const DEFAULT_PORT: u16 = 7667;

/// A parsed `udpm://GROUP:PORT?ttl=N` provider URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcmUrl {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Multicast TTL; 0 keeps traffic on the local host.
    pub ttl: u32,
}

impl LcmUrl {
    /// Multicast destination for published datagrams.
    pub fn destination(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.port)
    }
}

impl Default for LcmUrl {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            ttl: 0,
        }
    }
}

impl fmt::Display for LcmUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "udpm://{}:{}?ttl={}", self.group, self.port, self.ttl)
    }
}

impl FromStr for LcmUrl {
    type Err = BusError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| BusError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let rest = url
            .strip_prefix("udpm://")
            .ok_or_else(|| invalid("only udpm:// providers are supported"))?;
        let (address, query) = match rest.split_once('?') {
            Some((address, query)) => (address, Some(query)),
            None => (rest, None),
        };

        let mut parsed = LcmUrl::default();
        if !address.is_empty() {
            let (group, port) = match address.split_once(':') {
                Some((group, port)) => (group, Some(port)),
                None => (address, None),
            };
            parsed.group = group
                .parse()
                .map_err(|_| invalid("group is not an IPv4 address"))?;
            if let Some(port) = port {
                parsed.port = port.parse().map_err(|_| invalid("invalid port"))?;
            }
        }
        if !parsed.group.is_multicast() {
            return Err(invalid("group is not a multicast address"));
        }

        for option in query.into_iter().flat_map(|q| q.split('&')) {
            if option.is_empty() {
                continue;
            }
            match option.split_once('=') {
                Some(("ttl", value)) => {
                    parsed.ttl = value.parse().map_err(|_| invalid("invalid ttl"))?;
                }
                Some((key, _)) => warn!(key, "ignoring unsupported url option"),
                None => return Err(invalid("options must be key=value")),
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url_round_trips() {
        let url: LcmUrl = DEFAULT_LCM_URL.parse().unwrap();
        assert_eq!(url, LcmUrl::default());
        assert_eq!(url.to_string(), DEFAULT_LCM_URL);
    }

    #[test]
    fn custom_group_port_ttl() {
        let url: LcmUrl = "udpm://239.1.2.3:9000?ttl=1".parse().unwrap();
        assert_eq!(url.group, Ipv4Addr::new(239, 1, 2, 3));
        assert_eq!(url.port, 9000);
        assert_eq!(url.ttl, 1);
        assert_eq!(url.destination().port(), 9000);
    }

    #[test]
    fn bare_scheme_uses_defaults() {
        let url: LcmUrl = "udpm://".parse().unwrap();
        assert_eq!(url, LcmUrl::default());
    }

    #[test]
    fn unknown_options_are_ignored() {
        let url: LcmUrl = "udpm://239.255.76.67:7667?ttl=2&recv_buf_size=4096"
            .parse()
            .unwrap();
        assert_eq!(url.ttl, 2);
    }

    #[test]
    fn rejects_bad_urls() {
        for bad in [
            "tcpq://127.0.0.1:7700",
            "udpm://10.0.0.1:7667",
            "udpm://239.0.0.1:notaport",
            "udpm://239.0.0.1:7667?ttl=x",
            "udpm://239.0.0.1:7667?ttl",
            "udpm://not-an-ip:7667",
        ] {
            assert!(
                matches!(bad.parse::<LcmUrl>(), Err(BusError::InvalidUrl { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
