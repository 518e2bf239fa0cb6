//! Domain module - core state machines and value types
//!
//! Nothing in here touches the browser, the network or the filesystem. The
//! application layer drives these types; the infrastructure layer implements
//! the traits in [`services`].

pub mod circuit_breaker;
pub mod constants;
pub mod errors;
pub mod process_state;
pub mod scheduler;
pub mod services;
pub mod session_meta;
pub mod tuning;
pub mod usage;

pub use circuit_breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use errors::{ConfigError, CycleError, DriverError};
pub use process_state::ProcessState;
pub use scheduler::{AdaptiveScheduler, SleepMode};
pub use services::{
    BrowserLauncher, BrowserSession, LaunchSpec, MemoryProbe, Notifier, PageObserver, Severity,
    UpdateSource,
};
pub use session_meta::{FreshnessPolicy, MemorySample, SessionMeta};
pub use tuning::{Thresholds, Timings};
pub use usage::{Measurement, PollResult};
