//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bounded retries for optimistic claim-commit conflicts during payment
    pub max_retries: u32,
    /// Wait bound for wallet and payment locks, in milliseconds
    pub lock_timeout_ms: u64,
    /// ISO currency code used when displaying amounts
    pub currency: String,
    /// Capacity of the claim-event broadcast channel
    pub notification_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            lock_timeout_ms: 5_000,
            currency: "INR".to_string(),
            notification_buffer: 256,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, keeping defaults for
    /// anything absent or unparseable
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_retries: lookup("CAREWALLET_MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            lock_timeout_ms: lookup("CAREWALLET_LOCK_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.lock_timeout_ms),
            currency: lookup("CAREWALLET_CURRENCY")
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.currency),
            notification_buffer: lookup("CAREWALLET_NOTIFICATION_BUFFER")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.notification_buffer),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.currency, "INR");
        assert_eq!(config.notification_buffer, 256);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("CAREWALLET_MAX_RETRIES", "5"),
            ("CAREWALLET_LOCK_TIMEOUT_MS", "250"),
            ("CAREWALLET_CURRENCY", "usd"),
            ("CAREWALLET_NOTIFICATION_BUFFER", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.currency, "USD");
        assert_eq!(config.notification_buffer, 256);
    }
}
