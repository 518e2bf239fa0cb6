//! Default page event hooks

use std::sync::Arc;
use tracing::{debug, error};

use crate::domain::process_state::ProcessState;
use crate::domain::services::PageObserver;

/// Logs page traffic and counts renderer crashes as errors
pub struct LoggingObserver {
    state: Arc<ProcessState>,
}

impl LoggingObserver {
    pub fn new(state: Arc<ProcessState>) -> Self {
        Self { state }
    }
}

impl PageObserver for LoggingObserver {
    fn on_request(&self, method: &str, url: &str) {
        debug!(method, url, "Request");
    }

    fn on_response(&self, status: u32, url: &str) {
        debug!(status, url, "Response");
    }

    fn on_page_error(&self, message: &str) {
        error!(message, "Page error");
    }

    fn on_crash(&self) {
        let errors = self.state.record_error();
        error!(consecutive_errors = errors, "Page crashed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_counts_as_error() {
        let state = Arc::new(ProcessState::new());
        let observer = LoggingObserver::new(Arc::clone(&state));
        observer.on_request("GET", "https://example.invalid/");
        observer.on_crash();
        observer.on_crash();
        assert_eq!(state.consecutive_errors(), 2);
    }
}
