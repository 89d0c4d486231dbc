use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server selection policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Try eligible servers in configured order
    #[default]
    Failover,
    /// Weighted-random first pick over static weights
    Weighted,
    /// Weighted-random first pick over health-adaptive weights
    Smart,
}

/// Selection and dispatch engine tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Which selection policy drives candidate ordering
    pub policy: Policy,
    /// Per-attempt deadline for the outbound call, seconds
    pub dispatch_timeout_secs: u64,
    /// Same-server retries before moving on (ignored under the smart policy)
    pub retries: u32,
    /// Consecutive failures that open a server's circuit
    pub failure_threshold: u32,
    /// Seconds an open circuit blocks a server before a half-open probe
    pub circuit_reset_secs: u64,
    /// Lower clamp for computed weights; keeps recovering servers reachable
    pub min_weight: f64,
    /// Upper clamp for computed weights
    pub max_weight: f64,
    /// Average latency above which the latency penalty kicks in, milliseconds
    pub slow_threshold_ms: f64,
    /// Whether the short-TTL down cache is consulted before dispatching
    pub down_cache: bool,
    /// Down cache entry lifetime, seconds
    pub down_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: Policy::Failover,
            dispatch_timeout_secs: 5,
            retries: 1,
            failure_threshold: 3,
            circuit_reset_secs: 30,
            min_weight: 10.0,
            max_weight: 90.0,
            slow_threshold_ms: 2000.0,
            down_cache: true,
            down_ttl_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Validate engine configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "Engine dispatch_timeout_secs must be greater than 0"
            ));
        }

        if self.failure_threshold == 0 {
            return Err(anyhow::anyhow!(
                "Engine failure_threshold must be greater than 0"
            ));
        }

        if self.circuit_reset_secs == 0 {
            return Err(anyhow::anyhow!(
                "Engine circuit_reset_secs must be greater than 0"
            ));
        }

        if self.min_weight <= 0.0 {
            return Err(anyhow::anyhow!("Engine min_weight must be positive"));
        }

        if self.min_weight > self.max_weight {
            return Err(anyhow::anyhow!(
                "Engine min_weight ({}) must not exceed max_weight ({})",
                self.min_weight,
                self.max_weight
            ));
        }

        if self.slow_threshold_ms <= 0.0 {
            return Err(anyhow::anyhow!(
                "Engine slow_threshold_ms must be positive"
            ));
        }

        if self.down_cache && self.down_ttl_secs == 0 {
            return Err(anyhow::anyhow!(
                "Engine down_ttl_secs must be greater than 0 when the down cache is enabled"
            ));
        }

        Ok(())
    }

    /// Get the per-attempt deadline as Duration
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// Get the circuit reset window as Duration
    pub fn circuit_reset(&self) -> Duration {
        Duration::from_secs(self.circuit_reset_secs)
    }

    /// Get the down cache TTL as Duration
    pub fn down_ttl(&self) -> Duration {
        Duration::from_secs(self.down_ttl_secs)
    }

    /// Same-server retries effective under the given policy.
    /// The smart policy relies on health-gated selection instead.
    pub fn effective_retries(&self) -> u32 {
        match self.policy {
            Policy::Smart => 0,
            _ => self.retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.policy, Policy::Failover);
        assert_eq!(cfg.dispatch_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.circuit_reset(), Duration::from_secs(30));
        assert_eq!(cfg.down_ttl(), Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_smart_policy_disables_same_server_retries() {
        let mut cfg = EngineConfig {
            retries: 3,
            ..Default::default()
        };
        assert_eq!(cfg.effective_retries(), 3);
        cfg.policy = Policy::Smart;
        assert_eq!(cfg.effective_retries(), 0);
    }

    #[test]
    fn test_validation_rejects_inverted_clamps() {
        let cfg = EngineConfig {
            min_weight: 80.0,
            max_weight: 20.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let cfg = EngineConfig {
            dispatch_timeout_secs: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
