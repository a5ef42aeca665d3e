use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_port: u16,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    /// Consecutive same-class probe outcomes required to move health one
    /// level.
    pub health_threshold: u32,
    /// Probe samples retained per target.
    pub probe_window: usize,
    pub apply_timeout_secs: u64,
    pub fanout_ceiling_secs: u64,
    pub apply_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_port: env_or("WINDLASS_API_PORT", defaults.api_port),
            probe_interval_secs: env_or("WINDLASS_PROBE_INTERVAL_SECS", defaults.probe_interval_secs),
            probe_timeout_secs: env_or("WINDLASS_PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs),
            health_threshold: env_or("WINDLASS_HEALTH_THRESHOLD", defaults.health_threshold),
            probe_window: env_or("WINDLASS_PROBE_WINDOW", defaults.probe_window),
            apply_timeout_secs: env_or("WINDLASS_APPLY_TIMEOUT_SECS", defaults.apply_timeout_secs),
            fanout_ceiling_secs: env_or("WINDLASS_FANOUT_CEILING_SECS", defaults.fanout_ceiling_secs),
            apply_retries: env_or("WINDLASS_APPLY_RETRIES", defaults.apply_retries),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_port: 8420,
            probe_interval_secs: 30,
            probe_timeout_secs: 10,
            health_threshold: 3,
            probe_window: 120,
            apply_timeout_secs: 30,
            fanout_ceiling_secs: 180,
            apply_retries: 2,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.probe_interval_secs, 30);
        assert_eq!(config.health_threshold, 3);
        assert_eq!(config.apply_retries, 2);
    }
}
