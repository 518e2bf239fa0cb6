//! Shared application context
//!
//! One explicit object instead of ambient globals. The main loop and every
//! background task hold an `Arc` to it.

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::domain::process_state::ProcessState;
use crate::domain::services::{MemoryProbe, Notifier, Severity};
use crate::domain::session_meta::SessionMeta;
use crate::domain::tuning::{Thresholds, Timings};
use crate::infrastructure::session_store::SessionStore;

pub struct AppContext {
    pub state: Arc<ProcessState>,
    pub timings: Timings,
    pub thresholds: Thresholds,
    pub store: SessionStore,
    pub notifier: Arc<dyn Notifier>,
    pub probe: Arc<dyn MemoryProbe>,
}

impl AppContext {
    pub fn notify(&self, message: &str, severity: Severity) {
        self.notifier.notify(message, severity);
    }

    /// Record activity now and persist the session record.
    /// Persistence failures are logged only.
    pub async fn persist_activity(&self) {
        let now = Utc::now();
        self.state.touch_activity(now);
        let meta = SessionMeta::capture(now, self.state.last_browser_restart(), self.probe.sample());
        if let Err(e) = self.store.save(&meta).await {
            warn!(error = %e, "Could not save session meta");
        }
    }
}
