//! Application layer module
//!
//! This module wires the domain rules to the adapters: the polling cycle,
//! the browser and session lifecycles, maintenance timers and shutdown.

pub mod background;
pub mod browser_lifecycle;
pub mod context;
pub mod deadline;
pub mod orchestrator;
pub mod session_lifecycle;
pub mod shutdown;

pub use background::{BackgroundTasks, MemoryVerdict};
pub use browser_lifecycle::{BrowserLifecycle, SessionSlot};
pub use context::AppContext;
pub use deadline::{sleep_or_cancel, with_deadline};
pub use orchestrator::{CycleReport, CycleStage, PollingOrchestrator};
pub use session_lifecycle::{KeepAlive, SessionLifecycle};
pub use shutdown::ShutdownController;
