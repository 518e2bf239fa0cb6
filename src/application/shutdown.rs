//! Graceful shutdown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::browser_lifecycle::BrowserLifecycle;
use crate::application::context::AppContext;
use crate::domain::services::Severity;

pub struct ShutdownController {
    started: AtomicBool,
    ctx: Arc<AppContext>,
    browser: Arc<BrowserLifecycle>,
}

impl ShutdownController {
    pub fn new(ctx: Arc<AppContext>, browser: Arc<BrowserLifecycle>) -> Self {
        Self {
            started: AtomicBool::new(false),
            ctx,
            browser,
        }
    }

    /// Stop timers and the loop, close the browser and drain notifications.
    ///
    /// Only the first call does anything; later calls return `false`.
    pub async fn shutdown(&self, reason: &str) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        info!(reason, "Shutting down");
        self.ctx
            .notify("Volume guard is shutting down...", Severity::Info);
        self.ctx.state.shutdown_token().cancel();

        let close_timeout = self.ctx.timings.shutdown_close_timeout;
        if tokio::time::timeout(close_timeout, self.browser.close())
            .await
            .is_err()
        {
            warn!(timeout = ?close_timeout, "Browser did not close in time");
        }

        self.ctx.notify("Volume guard stopped safely", Severity::Info);
        self.ctx.notifier.flush(self.ctx.timings.shutdown_settle).await;
        info!("Shutdown complete");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestHarness;

    #[tokio::test(start_paused = true)]
    async fn second_shutdown_is_a_no_op() {
        let harness = TestHarness::new();
        {
            let mut slot = harness.browser.acquire().await;
            assert!(harness.browser.initialize(&mut slot).await);
        }
        let controller = ShutdownController::new(Arc::clone(&harness.ctx), Arc::clone(&harness.browser));

        assert!(controller.shutdown("SIGTERM").await);
        assert!(harness.ctx.state.is_shutting_down());
        assert_eq!(harness.portal.context_closes(), 1);
        let sent = harness.notices().len();

        assert!(!controller.shutdown("SIGINT").await);
        assert_eq!(harness.notices().len(), sent);
        assert_eq!(harness.portal.context_closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_browser_does_not_block_shutdown() {
        let harness = TestHarness::new();
        let controller = ShutdownController::new(Arc::clone(&harness.ctx), Arc::clone(&harness.browser));
        let _held = harness.browser.acquire().await;

        assert!(controller.shutdown("SIGTERM").await);
        assert!(harness
            .notices()
            .iter()
            .any(|(m, _)| m == "Volume guard stopped safely"));
    }
}
