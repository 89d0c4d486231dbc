use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum number of samples the rolling latency average weights over.
/// Beyond this the average behaves as a fixed 1/100 exponential decay.
const AVG_WINDOW: u32 = 100;

/// Circuit breaker states, derived from a record at read time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Server is excluded from the primary eligible set
    Open,
    /// Reset window has elapsed; one probing attempt is permitted
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Mutable health record for one server, keyed by server name.
///
/// Invariant: `circuit_open == true` implies
/// `consecutive_failures >= failure_threshold`.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
    pub avg_response_ms: f64,
    pub sample_count: u32,
    pub circuit_open: bool,
    pub down_until: Option<Instant>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            last_failure_at: None,
            avg_response_ms: 0.0,
            sample_count: 0,
            circuit_open: false,
            down_until: None,
        }
    }
}

impl HealthRecord {
    /// Derive the circuit state at `now` for the given reset window.
    ///
    /// Half-open is not stored: an open circuit whose reset window has
    /// elapsed reads as `HalfOpen`. A failed probe refreshes
    /// `last_failure_at` and the circuit reads as `Open` again; a
    /// successful probe closes it fully.
    pub fn circuit_state(&self, reset: Duration, now: Instant) -> CircuitState {
        if !self.circuit_open {
            return CircuitState::Closed;
        }
        match self.last_failure_at {
            Some(at) if now.duration_since(at) >= reset => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

/// Shared store of per-server health records.
///
/// Records are created lazily on first reference and live for the process
/// lifetime; the server set is small and fixed, so no eviction is needed.
/// One mutex guards the whole map: critical sections are short and nothing
/// awaits while holding the lock. Circuit transitions always happen under
/// the lock, so an open/close is never lost to a racing update.
#[derive(Debug)]
pub struct HealthStore {
    records: Mutex<HashMap<String, HealthRecord>>,
    failure_threshold: u32,
    circuit_reset: Duration,
    down_ttl: Duration,
}

impl HealthStore {
    pub fn new(failure_threshold: u32, circuit_reset: Duration, down_ttl: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            failure_threshold,
            circuit_reset,
            down_ttl,
        }
    }

    /// Record a successful attempt with its observed latency.
    /// Resets the failure streak and closes the circuit.
    pub fn record_success(&self, name: &str, latency_ms: f64) {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(name.to_string()).or_default();

        record.sample_count = record.sample_count.saturating_add(1).min(AVG_WINDOW);
        let window = record.sample_count.max(1) as f64;
        record.avg_response_ms += (latency_ms - record.avg_response_ms) / window;

        record.consecutive_failures = 0;
        if record.circuit_open {
            record.circuit_open = false;
            info!(server = %name, "Circuit closed after successful attempt");
        }
    }

    /// Record a failed attempt. Opens the circuit at the failure threshold;
    /// on an already-open circuit this refreshes the reset window, so a
    /// failed half-open probe reads as open again immediately.
    pub fn record_failure(&self, name: &str) {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(name.to_string()).or_default();

        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.last_failure_at = Some(Instant::now());

        if record.consecutive_failures >= self.failure_threshold && !record.circuit_open {
            record.circuit_open = true;
            warn!(
                server = %name,
                consecutive_failures = record.consecutive_failures,
                threshold = self.failure_threshold,
                "Circuit opened"
            );
        }
    }

    /// Put the server into the short-TTL down cache
    pub fn mark_down(&self, name: &str) {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(name.to_string()).or_default();
        record.down_until = Some(Instant::now() + self.down_ttl);
        debug!(server = %name, ttl_secs = self.down_ttl.as_secs(), "Server marked down");
    }

    /// Clear the server's down cache entry
    pub fn mark_up(&self, name: &str) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(name) {
            record.down_until = None;
        }
    }

    /// Whether the server is currently in the down cache.
    /// Entries expire lazily by wall-clock comparison; there is no sweeper.
    pub fn is_marked_down(&self, name: &str) -> bool {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(name) {
            Some(record) => match record.down_until {
                Some(until) if Instant::now() < until => true,
                Some(_) => {
                    record.down_until = None;
                    false
                }
                None => false,
            },
            None => false,
        }
    }

    /// Clone the server's record, creating the default if absent
    pub fn snapshot(&self, name: &str) -> HealthRecord {
        let mut records = self.records.lock().unwrap();
        records.entry(name.to_string()).or_default().clone()
    }

    /// Derive the server's circuit state now
    pub fn circuit_state(&self, name: &str) -> CircuitState {
        self.snapshot(name)
            .circuit_state(self.circuit_reset, Instant::now())
    }

    pub fn circuit_reset(&self) -> Duration {
        self.circuit_reset
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }
}
