use crate::config::{EngineConfig, ServerDescriptor};
use crate::health::HealthRecord;

/// Compute the dynamic selection weight for a server.
///
/// Starts from the static weight, then applies penalties in sequence: a
/// linear latency penalty once the rolling average exceeds the slow
/// threshold, and a failure penalty that divides by the failure streak
/// plus one. An open circuit collapses the weight to the configured floor,
/// which keeps a small non-zero probability of selection so a recovering
/// server still sees probe traffic. The result is clamped to
/// `[min_weight, max_weight]`.
///
/// Pure function: no I/O, no state beyond its inputs.
pub fn compute_weight(
    descriptor: &ServerDescriptor,
    record: &HealthRecord,
    config: &EngineConfig,
) -> f64 {
    if record.circuit_open {
        return config.min_weight;
    }

    let mut weight = descriptor.weight as f64;

    if record.avg_response_ms > config.slow_threshold_ms {
        weight /= record.avg_response_ms / config.slow_threshold_ms;
    }

    if record.consecutive_failures > 0 {
        weight /= (record.consecutive_failures + 1) as f64;
    }

    weight.clamp(config.min_weight, config.max_weight)
}
