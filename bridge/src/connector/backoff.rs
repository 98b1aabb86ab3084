//! Respawn backoff for the connector process.

use std::time::Duration;

/// Exponential backoff applied between failed connector spawn or handshake
/// attempts. A process that simply died is respawned immediately; only
/// consecutive failures to bring a new one up are delayed.
#[derive(Debug, Clone)]
pub struct RespawnBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RespawnBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RespawnBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// delay = min(base_delay * 2^(failures-1), max_delay)
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = failures.saturating_sub(1).min(63);
        let factor = 2u64.saturating_pow(exponent);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }
}
