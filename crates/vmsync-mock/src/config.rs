//! Mock server configuration, read from the environment.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3210;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConfig {
    pub port: u16,
    /// Sessions idle for longer than this are closed by the sweeper.
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        MockConfig {
            port: DEFAULT_PORT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl MockConfig {
    /// Reads `VMSYNC_MOCK_PORT`, `VMSYNC_IDLE_TIMEOUT_SECS` and
    /// `VMSYNC_SWEEP_INTERVAL_SECS`. Unset or unparsable values keep their
    /// defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = MockConfig::default();
        MockConfig {
            port: parse_var(&lookup, "VMSYNC_MOCK_PORT").unwrap_or(defaults.port),
            idle_timeout: parse_var(&lookup, "VMSYNC_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            sweep_interval: parse_var(&lookup, "VMSYNC_SWEEP_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
