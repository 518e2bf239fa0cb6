//! Timer-driven maintenance tasks
//!
//! Keep-alive, memory watchdog and scheduled restart. Each runs on its own
//! interval until the shutdown token fires and returns its name so the
//! supervisor can tell which task ended.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::application::browser_lifecycle::BrowserLifecycle;
use crate::application::context::AppContext;
use crate::application::session_lifecycle::{KeepAlive, SessionLifecycle};
use crate::domain::services::Severity;

/// What the memory watchdog decided on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryVerdict {
    Normal,
    High,
    Critical,
}

pub struct BackgroundTasks {
    ctx: Arc<AppContext>,
    browser: Arc<BrowserLifecycle>,
    sessions: Arc<SessionLifecycle>,
}

impl BackgroundTasks {
    pub fn new(
        ctx: Arc<AppContext>,
        browser: Arc<BrowserLifecycle>,
        sessions: Arc<SessionLifecycle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            browser,
            sessions,
        })
    }

    /// Spawn all three tasks into `tasks`
    pub fn spawn_all(self: &Arc<Self>, tasks: &mut JoinSet<&'static str>) {
        let timings = &self.ctx.timings;

        let this = Arc::clone(self);
        tasks.spawn(every(
            "keep-alive",
            timings.keep_alive_interval,
            Arc::clone(&self.ctx),
            move || {
                let this = Arc::clone(&this);
                async move { this.keep_alive_tick().await }
            },
        ));

        let this = Arc::clone(self);
        tasks.spawn(every(
            "memory-watchdog",
            timings.memory_check_interval,
            Arc::clone(&self.ctx),
            move || {
                let this = Arc::clone(&this);
                async move {
                    this.memory_tick().await;
                }
            },
        ));

        let this = Arc::clone(self);
        tasks.spawn(every(
            "scheduled-restart",
            timings.browser_restart_interval,
            Arc::clone(&self.ctx),
            move || {
                let this = Arc::clone(&this);
                async move { this.scheduled_restart_tick().await }
            },
        ));

        info!("Background tasks started");
    }

    /// Reload the page unless a cycle currently holds the browser
    pub async fn keep_alive_tick(&self) {
        let Some(mut slot) = self.browser.try_acquire() else {
            debug!("Browser busy, skipping keep-alive");
            return;
        };

        let Some(session) = slot.session() else {
            return;
        };
        if !session.has_live_page().await {
            debug!("No live page, skipping keep-alive");
            return;
        }
        let outcome = self.sessions.keep_alive(session).await;

        if outcome == KeepAlive::RestartRequested {
            if let Err(e) = self.browser.restart(&mut slot).await {
                error!(error = %e, "Restart after keep-alive failures failed");
            }
        }
    }

    pub async fn memory_tick(&self) -> MemoryVerdict {
        let limits = &self.ctx.thresholds;
        let rss = self.ctx.probe.sample().rss;

        if rss > limits.critical_memory_mb() {
            error!(
                rss_mb = rss,
                limit_mb = limits.critical_memory_mb(),
                "Critical memory usage, forcing browser restart"
            );
            if let Err(e) = self.browser.restart_now().await {
                error!(error = %e, "Memory-triggered restart failed");
            }
            MemoryVerdict::Critical
        } else if rss > limits.max_memory_mb {
            warn!(rss_mb = rss, limit_mb = limits.max_memory_mb, "High memory usage");
            self.ctx
                .notify(&format!("High memory usage: {rss} MB"), Severity::Warn);
            if !self.ctx.probe.request_collection() {
                debug!("Memory probe cannot trigger a collection pass");
            }
            MemoryVerdict::High
        } else {
            debug!(rss_mb = rss, "Memory usage normal");
            MemoryVerdict::Normal
        }
    }

    pub async fn scheduled_restart_tick(&self) {
        info!("Scheduled browser restart");
        if let Err(e) = self.browser.restart_now().await {
            error!(error = %e, "Scheduled browser restart failed");
        }
    }
}

/// Run `tick` every `period`, first after one full period, until shutdown
async fn every<F, Fut>(
    name: &'static str,
    period: Duration,
    ctx: Arc<AppContext>,
    tick: F,
) -> &'static str
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let token = ctx.state.shutdown_token().clone();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => {
                debug!(task = name, "Background task stopping");
                break;
            }
            _ = ticker.tick() => {
                if ctx.state.is_shutting_down() {
                    break;
                }
                tick().await;
            }
        }
    }
    name
}
