use std::str::FromStr;
use std::time::Duration;

use serbus_bus::ChannelBinding;
use serbus_frame::FramingConfig;

/// What to do when a frame is cut at the length limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Log each forced emission at debug level.
    #[default]
    Report,
    /// Publish without logging.
    Silent,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "report" => Ok(Self::Report),
            "silent" => Ok(Self::Silent),
            other => Err(format!("unknown overflow policy '{other}' (expected report or silent)")),
        }
    }
}

/// Immutable settings for one bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub framing: FramingConfig,
    pub binding: ChannelBinding,
    /// Bound on each readiness wait; `None` waits indefinitely.
    pub heartbeat: Option<Duration>,
    pub overflow: OverflowPolicy,
}

impl BridgeConfig {
    /// Default framing, no heartbeat, overflow reported.
    pub fn new(binding: ChannelBinding) -> Self {
        Self {
            framing: FramingConfig::default(),
            binding,
            heartbeat: None,
            overflow: OverflowPolicy::default(),
        }
    }

    pub fn with_framing(mut self, framing: FramingConfig) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Option<Duration>) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let binding = ChannelBinding::new("devi", "devo").unwrap();
        let config = BridgeConfig::new(binding.clone());
        assert_eq!(config.binding, binding);
        assert_eq!(config.heartbeat, None);
        assert_eq!(config.overflow, OverflowPolicy::Report);
        assert_eq!(config.framing, FramingConfig::default());
    }

    #[test]
    fn overflow_policy_parses() {
        assert_eq!("report".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Report);
        assert_eq!("silent".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Silent);
        assert!("loud".parse::<OverflowPolicy>().is_err());
    }
}
