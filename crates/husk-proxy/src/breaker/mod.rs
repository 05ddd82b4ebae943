//! Circuit breaker around a [`RemoteFetcher`]
//!
//! `Closed` records the outcome of every call in a rolling window and trips
//! to `Open` once the failure ratio reaches the threshold. `Open` answers
//! "not found" without touching the upstream until the reset timeout has
//! passed, then `HalfOpen` lets exactly one trial call through: success
//! closes the circuit, failure opens it again.
//!
//! Upstream errors never leave the breaker. They are recorded and turned
//! into the same `Ok(None)` a real 404 produces.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use husk_config::BreakerSection;
use husk_core::utils::SharedClock;

use crate::client::{RemoteContent, RemoteFetcher};
use crate::ProxyResult;

/// Breaker policy
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Failure ratio in `(0, 1]` that trips the circuit
    pub failure_rate_threshold: f64,
    /// Number of most recent calls the ratio is computed over
    pub window_size: usize,
    /// Calls needed in the window before the ratio is evaluated
    pub minimum_calls: usize,
    /// Time spent open before a trial call
    pub reset_timeout: Duration,
}

impl From<&BreakerSection> for BreakerConfig {
    fn from(section: &BreakerSection) -> Self {
        Self {
            failure_rate_threshold: section.failure_rate_threshold,
            window_size: section.window_size.max(1),
            minimum_calls: section.minimum_calls.max(1),
            reset_timeout: section.reset_timeout(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::from(&BreakerSection::default())
    }
}

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
enum State {
    /// `true` entries are failures, newest last
    Closed { window: VecDeque<bool> },
    Open { since: DateTime<Utc> },
    HalfOpen { trial_in_flight: bool },
}

/// [`RemoteFetcher`] decorator that fails fast while the upstream is unhealthy
pub struct CircuitBreaker<F> {
    inner: F,
    config: BreakerConfig,
    clock: SharedClock,
    state: Mutex<State>,
}

/// Permission to make one upstream call
struct Permit<'a, F> {
    breaker: &'a CircuitBreaker<F>,
    trial: bool,
    settled: bool,
}

impl<F> Drop for Permit<'_, F> {
    fn drop(&mut self) {
        // A cancelled trial must not leave the circuit half-open forever
        if self.trial && !self.settled {
            let mut state = self.breaker.state.lock();
            if let State::HalfOpen { trial_in_flight } = &mut *state {
                *trial_in_flight = false;
            }
        }
    }
}

impl<F: RemoteFetcher> CircuitBreaker<F> {
    pub fn new(inner: F, config: BreakerConfig, clock: SharedClock) -> Self {
        Self {
            inner,
            config,
            clock,
            state: Mutex::new(State::Closed {
                window: VecDeque::new(),
            }),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn state(&self) -> BreakerState {
        match &*self.state.lock() {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    fn acquire(&self) -> Option<Permit<'_, F>> {
        let mut state = self.state.lock();
        let trial = match &mut *state {
            State::Closed { .. } => false,
            State::Open { since } => {
                let elapsed = (self.clock.now() - *since).to_std().unwrap_or_default();
                if elapsed < self.config.reset_timeout {
                    return None;
                }
                info!("circuit half-open, sending trial request");
                *state = State::HalfOpen { trial_in_flight: true };
                true
            },
            State::HalfOpen { trial_in_flight } => {
                if *trial_in_flight {
                    return None;
                }
                *trial_in_flight = true;
                true
            },
        };

        Some(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn record(&self, mut permit: Permit<'_, F>, failed: bool) {
        permit.settled = true;
        let mut state = self.state.lock();
        let now = self.clock.now();

        match &mut *state {
            State::Closed { window } => {
                window.push_back(failed);
                while window.len() > self.config.window_size {
                    window.pop_front();
                }

                let failures = window.iter().filter(|outcome| **outcome).count();
                let ratio = failures as f64 / window.len() as f64;
                if window.len() >= self.config.minimum_calls && ratio >= self.config.failure_rate_threshold {
                    warn!(failures, calls = window.len(), "circuit opened");
                    *state = State::Open { since: now };
                }
            },
            State::HalfOpen { .. } if permit.trial => {
                if failed {
                    warn!("trial request failed, circuit open again");
                    *state = State::Open { since: now };
                } else {
                    info!("trial request succeeded, circuit closed");
                    *state = State::Closed {
                        window: VecDeque::new(),
                    };
                }
            },
            // Calls admitted before the circuit opened do not change it
            State::HalfOpen { .. } | State::Open { .. } => {},
        }
    }

    fn settle(
        &self,
        permit: Permit<'_, F>,
        what: &str,
        result: ProxyResult<Option<RemoteContent>>,
    ) -> ProxyResult<Option<RemoteContent>> {
        match result {
            Ok(content) => {
                self.record(permit, false);
                Ok(content)
            },
            Err(e) => {
                warn!(what, error = %e, "upstream request failed");
                self.record(permit, true);
                Ok(None)
            },
        }
    }
}

#[async_trait]
impl<F: RemoteFetcher> RemoteFetcher for CircuitBreaker<F> {
    async fn load_package(&self, name: &str) -> ProxyResult<Option<RemoteContent>> {
        let Some(permit) = self.acquire() else {
            debug!(package = name, "circuit open, skipping upstream");
            return Ok(None);
        };
        let result = self.inner.load_package(name).await;
        self.settle(permit, name, result)
    }

    async fn load_asset(&self, path: &str) -> ProxyResult<Option<RemoteContent>> {
        let Some(permit) = self.acquire() else {
            debug!(asset = path, "circuit open, skipping upstream");
            return Ok(None);
        };
        let result = self.inner.load_asset(path).await;
        self.settle(permit, path, result)
    }
}

impl<F> fmt::Debug for CircuitBreaker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish()
    }
}
