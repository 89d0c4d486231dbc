use rand::Rng;
use std::sync::Arc;
use tracing::debug;

use crate::balancer::weight::compute_weight;
use crate::config::{EngineConfig, Policy, ServerDescriptor};
use crate::error::{ShuntError, ShuntResult};
use crate::health::{CircuitState, HealthStore};

/// Orders a tenant's server set into a try sequence under the configured
/// policy. The output contains each member of the set exactly once.
///
/// Servers with an open circuit are excluded from the primary eligible
/// set; a server whose reset window has elapsed reads as half-open and is
/// eligible for one probing attempt. When nothing is eligible the full
/// original set is returned as a last resort: attempting a possibly
/// recovered server beats returning no candidates.
#[derive(Debug, Clone)]
pub struct ServerSelector {
    config: Arc<EngineConfig>,
}

impl ServerSelector {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Produce the ordered candidate list for one request.
    ///
    /// Randomness is injected so tests can drive selection with a
    /// deterministic generator.
    pub fn select<R: Rng>(
        &self,
        set: &[ServerDescriptor],
        store: &HealthStore,
        rng: &mut R,
    ) -> ShuntResult<Vec<ServerDescriptor>> {
        if set.is_empty() {
            return Err(ShuntError::config("no servers configured for tenant"));
        }

        if set.len() == 1 {
            return Ok(set.to_vec());
        }

        let eligible: Vec<ServerDescriptor> = set
            .iter()
            .filter(|s| store.circuit_state(&s.name) != CircuitState::Open)
            .cloned()
            .collect();

        let ordered = match self.config.policy {
            Policy::Failover => {
                if eligible.is_empty() {
                    set.to_vec()
                } else {
                    eligible
                }
            }
            Policy::Weighted => {
                let candidates = if eligible.is_empty() {
                    set.to_vec()
                } else {
                    eligible
                };
                let weights: Vec<f64> = candidates.iter().map(|s| s.weight as f64).collect();
                weighted_head(candidates, &weights, rng)
            }
            Policy::Smart => {
                // All circuits open: draw from the full set with adaptive
                // weights anyway (each collapses to the floor).
                let candidates = if eligible.is_empty() {
                    set.to_vec()
                } else {
                    eligible
                };
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|s| compute_weight(s, &store.snapshot(&s.name), &self.config))
                    .collect();
                weighted_head(candidates, &weights, rng)
            }
        };

        debug!(
            policy = ?self.config.policy,
            order = ?ordered.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Selected candidate order"
        );

        Ok(ordered)
    }
}

/// Move one weighted-random pick to the front; the remaining candidates
/// keep their original relative order as the fallback sequence.
fn weighted_head<R: Rng>(
    mut candidates: Vec<ServerDescriptor>,
    weights: &[f64],
    rng: &mut R,
) -> Vec<ServerDescriptor> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return candidates;
    }

    let draw = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    let mut picked = 0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if draw < cumulative {
            picked = i;
            break;
        }
    }

    let head = candidates.remove(picked);
    candidates.insert(0, head);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn descriptor(name: &str, weight: u32) -> ServerDescriptor {
        ServerDescriptor {
            name: name.to_string(),
            host: format!("{}.internal", name),
            weight,
        }
    }

    fn selector(policy: Policy) -> (ServerSelector, HealthStore) {
        let config = Arc::new(EngineConfig {
            policy,
            ..Default::default()
        });
        let store = HealthStore::new(
            config.failure_threshold,
            config.circuit_reset(),
            config.down_ttl(),
        );
        (ServerSelector::new(config), store)
    }

    #[test]
    fn test_empty_set_is_configuration_error() {
        let (sel, store) = selector(Policy::Failover);
        let mut rng = StdRng::seed_from_u64(1);
        let result = sel.select(&[], &store, &mut rng);
        assert!(matches!(result, Err(ShuntError::Config { .. })));
    }

    #[test]
    fn test_single_server_is_identity_under_any_policy() {
        for policy in [Policy::Failover, Policy::Weighted, Policy::Smart] {
            let (sel, store) = selector(policy);
            let mut rng = StdRng::seed_from_u64(1);
            let set = vec![descriptor("only", 50)];
            let ordered = sel.select(&set, &store, &mut rng).unwrap();
            assert_eq!(ordered.len(), 1);
            assert_eq!(ordered[0].name, "only");
        }
    }

    #[test]
    fn test_failover_keeps_configured_order() {
        let (sel, store) = selector(Policy::Failover);
        let mut rng = StdRng::seed_from_u64(1);
        let set = vec![descriptor("primary", 70), descriptor("backup", 30)];
        let ordered = sel.select(&set, &store, &mut rng).unwrap();
        assert_eq!(ordered[0].name, "primary");
        assert_eq!(ordered[1].name, "backup");
    }

    #[test]
    fn test_failover_excludes_open_circuit() {
        let (sel, store) = selector(Policy::Failover);
        let mut rng = StdRng::seed_from_u64(1);
        let set = vec![descriptor("primary", 70), descriptor("backup", 30)];

        for _ in 0..3 {
            store.record_failure("primary");
        }
        let ordered = sel.select(&set, &store, &mut rng).unwrap();
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].name, "backup");
    }

    #[test]
    fn test_failover_all_open_falls_back_to_full_set() {
        let (sel, store) = selector(Policy::Failover);
        let mut rng = StdRng::seed_from_u64(1);
        let set = vec![descriptor("primary", 70), descriptor("backup", 30)];

        for name in ["primary", "backup"] {
            for _ in 0..3 {
                store.record_failure(name);
            }
        }
        let ordered = sel.select(&set, &store, &mut rng).unwrap();
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].name, "primary");
    }

    #[test]
    fn test_weighted_output_contains_each_member_once() {
        let (sel, store) = selector(Policy::Weighted);
        let mut rng = StdRng::seed_from_u64(7);
        let set = vec![
            descriptor("a", 10),
            descriptor("b", 20),
            descriptor("c", 70),
        ];
        for _ in 0..200 {
            let ordered = sel.select(&set, &store, &mut rng).unwrap();
            assert_eq!(ordered.len(), 3);
            let mut names: Vec<&str> = ordered.iter().map(|s| s.name.as_str()).collect();
            names.sort();
            assert_eq!(names, vec!["a", "b", "c"]);
        }
    }

    #[test]
    fn test_weighted_fallback_keeps_relative_order() {
        let (sel, store) = selector(Policy::Weighted);
        let mut rng = StdRng::seed_from_u64(7);
        let set = vec![
            descriptor("a", 10),
            descriptor("b", 20),
            descriptor("c", 70),
        ];
        for _ in 0..200 {
            let ordered = sel.select(&set, &store, &mut rng).unwrap();
            let rest: Vec<&str> = ordered[1..].iter().map(|s| s.name.as_str()).collect();
            // Whatever was picked first, the remainder keeps config order
            let expected: Vec<&str> = ["a", "b", "c"]
                .iter()
                .filter(|n| **n != ordered[0].name.as_str())
                .copied()
                .collect();
            assert_eq!(rest, expected);
        }
    }

    #[test]
    fn test_smart_never_orders_open_server_before_healthy() {
        let (sel, store) = selector(Policy::Smart);
        let mut rng = StdRng::seed_from_u64(3);
        let set = vec![descriptor("a", 50), descriptor("b", 50)];

        // b: circuit open, failure just now (inside the 30s reset window)
        for _ in 0..3 {
            store.record_failure("b");
        }

        for _ in 0..500 {
            let ordered = sel.select(&set, &store, &mut rng).unwrap();
            assert_eq!(ordered[0].name, "a", "open server must not be tried first");
        }
    }

    #[test]
    fn test_smart_all_open_still_yields_candidates() {
        let (sel, store) = selector(Policy::Smart);
        let mut rng = StdRng::seed_from_u64(3);
        let set = vec![descriptor("a", 50), descriptor("b", 50)];
        for name in ["a", "b"] {
            for _ in 0..3 {
                store.record_failure(name);
            }
        }
        let ordered = sel.select(&set, &store, &mut rng).unwrap();
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn test_half_open_server_is_eligible_for_probe() {
        let config = Arc::new(EngineConfig {
            policy: Policy::Failover,
            circuit_reset_secs: 1,
            ..Default::default()
        });
        let store = HealthStore::new(
            config.failure_threshold,
            Duration::from_millis(40),
            config.down_ttl(),
        );
        let sel = ServerSelector::new(config);
        let mut rng = StdRng::seed_from_u64(1);
        let set = vec![descriptor("primary", 70), descriptor("backup", 30)];

        for _ in 0..3 {
            store.record_failure("primary");
        }
        assert_eq!(
            sel.select(&set, &store, &mut rng).unwrap()[0].name,
            "backup"
        );

        std::thread::sleep(Duration::from_millis(60));
        // Reset window elapsed: primary reads half-open and is eligible again
        let ordered = sel.select(&set, &store, &mut rng).unwrap();
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].name, "primary");
    }
}
