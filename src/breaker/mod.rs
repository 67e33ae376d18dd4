//! Per-service circuit breaker wrapping arbitrary async operations

use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{GatewayError, Result};

/// Circuit state. Legal transitions are CLOSED->OPEN, OPEN->HALF_OPEN,
/// HALF_OPEN->CLOSED and HALF_OPEN->OPEN; no other edge is ever taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
        }
    }
}

/// Read-only view of one circuit, for introspection endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub service_name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_age_ms: Option<u64>,
}

/// Failure-isolation guard keyed by service name.
///
/// Circuits are created lazily in CLOSED state on first use. The
/// read-check-mutate sequences around each call are serialized by one async
/// mutex per service key, so concurrent successes and failures cannot corrupt
/// the counters or skip a threshold transition. The wrapped operation itself
/// runs outside the lock.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: DashMap<String, Arc<Mutex<Circuit>>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: DashMap::new(),
        }
    }

    fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.config.open_timeout_ms)
    }

    fn circuit(&self, service: &str) -> Arc<Mutex<Circuit>> {
        self.circuits
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Circuit::new())))
            .clone()
    }

    /// Run `operation` under this service's circuit.
    ///
    /// While the circuit is OPEN and the open timeout has not elapsed, the
    /// operation is not invoked at all and a `CircuitOpen` error is returned.
    /// Once the timeout elapses the circuit moves to HALF_OPEN and a trial
    /// call goes through. Operation failures propagate to the caller after
    /// bookkeeping.
    pub async fn execute<T, F, Fut>(&self, service: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let circuit = self.circuit(service);

        {
            let mut c = circuit.lock().await;
            if c.state == CircuitState::Open {
                let elapsed = c.last_failure_at.map(|at| at.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed < self.open_timeout() => {
                        debug!(service, ?elapsed, "Circuit open, short-circuiting call");
                        return Err(GatewayError::CircuitOpen(service.to_string()));
                    }
                    _ => {
                        c.state = CircuitState::HalfOpen;
                        c.consecutive_successes = 0;
                        info!(service, "Circuit half-open, allowing trial call");
                    }
                }
            }
        }

        let outcome = operation().await;

        let mut c = circuit.lock().await;
        match outcome {
            Ok(value) => {
                self.record_success(service, &mut c);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(service, &mut c);
                Err(e)
            }
        }
    }

    /// Like [`execute`](Self::execute), but any short-circuit or operation
    /// failure yields `fallback()` instead of an error (bookkeeping still
    /// happens).
    pub async fn execute_with_fallback<T, F, Fut, FB>(
        &self,
        service: &str,
        operation: F,
        fallback: FB,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce() -> T,
    {
        match self.execute(service, operation).await {
            Ok(value) => value,
            Err(_) => fallback(),
        }
    }

    fn record_success(&self, service: &str, c: &mut Circuit) {
        match c.state {
            CircuitState::HalfOpen => {
                c.consecutive_successes += 1;
                if c.consecutive_successes >= self.config.half_open_success_threshold {
                    c.state = CircuitState::Closed;
                    c.consecutive_failures = 0;
                    c.consecutive_successes = 0;
                    info!(service, "Circuit closed after successful trial calls");
                }
            }
            CircuitState::Closed => {
                c.consecutive_failures = 0;
            }
            // A call that started before a concurrent probe failure reopened
            // the circuit. OPEN only leaves via the timeout path.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, service: &str, c: &mut Circuit) {
        c.last_failure_at = Some(Instant::now());
        c.consecutive_failures += 1;
        c.consecutive_successes = 0;

        match c.state {
            CircuitState::HalfOpen => {
                c.state = CircuitState::Open;
                warn!(service, "Trial call failed, circuit reopened");
            }
            CircuitState::Closed => {
                if c.consecutive_failures >= self.config.failure_threshold {
                    c.state = CircuitState::Open;
                    warn!(
                        service,
                        failures = c.consecutive_failures,
                        "Failure threshold reached, circuit opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Snapshot of one circuit, if it has been used.
    pub async fn state(&self, service: &str) -> Option<CircuitSnapshot> {
        let circuit = self.circuits.get(service)?.value().clone();
        let c = circuit.lock().await;
        Some(snapshot(service, &c))
    }

    /// Discard a circuit's state; the next access starts fresh at CLOSED.
    pub fn reset(&self, service: &str) -> bool {
        self.circuits.remove(service).is_some()
    }

    /// Snapshots of every circuit seen so far.
    pub async fn all_states(&self) -> Vec<CircuitSnapshot> {
        let entries: Vec<(String, Arc<Mutex<Circuit>>)> = self
            .circuits
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut snapshots = Vec::with_capacity(entries.len());
        for (name, circuit) in entries {
            let c = circuit.lock().await;
            snapshots.push(snapshot(&name, &c));
        }
        snapshots.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        snapshots
    }
}

fn snapshot(service: &str, c: &Circuit) -> CircuitSnapshot {
    CircuitSnapshot {
        service_name: service.to_string(),
        state: c.state,
        consecutive_failures: c.consecutive_failures,
        consecutive_successes: c.consecutive_successes,
        last_failure_age_ms: c.last_failure_at.map(|at| at.elapsed().as_millis() as u64),
    }
}
