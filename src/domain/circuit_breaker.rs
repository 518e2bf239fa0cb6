//! Circuit breaker guarding the portal measurement
//!
//! ```text
//! CLOSED ──failures ≥ threshold──► OPEN
//!    ▲                               │ cooldown elapsed
//!    │                               ▼
//!    └──────── success ──────── HALF_OPEN ── failure ──► OPEN
//! ```
//!
//! `HALF_OPEN` is only entered from `OPEN` and resolves after exactly one probe.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info};

use crate::domain::errors::CycleError;

/// Breaker position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Point-in-time view of the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// While open and cooling down the operation is not invoked and
    /// [`CycleError::CircuitOpen`] is returned. Operation errors are recorded and
    /// then returned unchanged.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, CycleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CycleError>>,
    {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == BreakerState::Open {
                if self.cooling_down(&inner, Instant::now()) {
                    return Err(CycleError::CircuitOpen);
                }
                inner.state = BreakerState::HalfOpen;
                info!("Circuit breaker: trying HALF_OPEN probe");
            }
        }

        let result = operation().await;

        let mut inner = self.inner.lock().await;
        match &result {
            Ok(_) => {
                inner.failure_count = 0;
                inner.state = BreakerState::Closed;
            }
            Err(_) => {
                inner.failure_count += 1;
                inner.last_failure = Some(Instant::now());
                if inner.failure_count >= self.threshold || inner.state == BreakerState::HalfOpen {
                    if inner.state != BreakerState::Open {
                        error!(failures = inner.failure_count, "Circuit breaker OPEN");
                    }
                    inner.state = BreakerState::Open;
                }
            }
        }
        result
    }

    /// True while a call would be rejected without running.
    pub async fn rejects_now(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state == BreakerState::Open && self.cooling_down(&inner, Instant::now())
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
        }
    }

    fn cooling_down(&self, inner: &BreakerInner, now: Instant) -> bool {
        inner
            .last_failure
            .is_some_and(|at| now.saturating_duration_since(at) < self.cooldown)
    }
}
