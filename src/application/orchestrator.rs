//! Polling orchestrator
//!
//! Drives one measurement cycle at a time through the stages in
//! [`CycleStage`], applies the two failure layers and schedules the next run.
//!
//! ```text
//! Idle -> EnsuringBrowser -> EnsuringSession -> Measuring -> TopUpDecision
//!      -> Reporting -> Scheduled -> Idle          (ShuttingDown absorbs all)
//! ```
//!
//! The inner layer turns any cycle error into "no measurement", counts it and
//! restarts the browser after repeated failures. The outer layer catches what
//! escapes (a failed restart) and backs off for the error pause.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::browser_lifecycle::{BrowserLifecycle, SessionSlot};
use crate::application::context::AppContext;
use crate::application::deadline::{sleep_or_cancel, with_deadline};
use crate::application::session_lifecycle::SessionLifecycle;
use crate::domain::circuit_breaker::CircuitBreaker;
use crate::domain::constants::portal::{OVERVIEW_URL, TOP_UP_VOLUME_GB};
use crate::domain::errors::CycleError;
use crate::domain::process_state::ProcessState;
use crate::domain::scheduler::AdaptiveScheduler;
use crate::domain::services::{BrowserSession, Severity, UpdateSource};
use crate::domain::usage::{round3, PollResult};

/// Stages of a polling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    EnsuringBrowser,
    EnsuringSession,
    Measuring,
    TopUpDecision,
    Reporting,
    Scheduled,
    ShuttingDown,
}

impl CycleStage {
    /// Enter this stage unless shutdown has begun
    fn enter(self, state: &ProcessState) -> Result<(), CycleError> {
        if state.is_shutting_down() {
            debug!(from = ?self, to = ?CycleStage::ShuttingDown, "Stage transition");
            return Err(CycleError::ShuttingDown);
        }
        debug!(stage = ?self, "Stage transition");
        Ok(())
    }
}

/// Outcome of one supervised cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    /// Available volume in GB, 0 when the cycle produced nothing usable
    pub measurement: f64,
    pub next_interval: Duration,
}

pub struct PollingOrchestrator {
    ctx: Arc<AppContext>,
    browser: Arc<BrowserLifecycle>,
    sessions: Arc<SessionLifecycle>,
    breaker: CircuitBreaker,
    scheduler: AdaptiveScheduler,
    update_source: Option<Arc<dyn UpdateSource>>,
}

impl PollingOrchestrator {
    pub fn new(
        ctx: Arc<AppContext>,
        browser: Arc<BrowserLifecycle>,
        sessions: Arc<SessionLifecycle>,
        scheduler: AdaptiveScheduler,
        update_source: Option<Arc<dyn UpdateSource>>,
    ) -> Self {
        let breaker = CircuitBreaker::new(
            ctx.thresholds.max_consecutive_errors,
            ctx.thresholds.circuit_cooldown,
        );
        Self {
            ctx,
            browser,
            sessions,
            breaker,
            scheduler,
            update_source,
        }
    }

    /// Poll until the shutdown token fires
    pub async fn run(&self) {
        info!(mode = ?self.scheduler.mode(), "Starting polling loop");

        let token = self.ctx.state.shutdown_token().clone();
        loop {
            if CycleStage::Idle.enter(&self.ctx.state).is_err() {
                break;
            }
            if let Some(source) = &self.update_source {
                source.check(self.ctx.notifier.as_ref()).await;
            }
            let report = self.run_once().await;

            if CycleStage::Scheduled.enter(&self.ctx.state).is_err()
                || !sleep_or_cancel(&token, report.next_interval).await
            {
                break;
            }
        }
        info!("Polling loop stopped");
    }

    /// One supervised cycle plus the interval until the next one
    pub async fn run_once(&self) -> CycleReport {
        let span = info_span!("cycle", id = %Uuid::new_v4());
        self.supervise().instrument(span).await
    }

    async fn supervise(&self) -> CycleReport {
        let state = &self.ctx.state;
        let limits = &self.ctx.thresholds;

        let (measurement, next_interval) = match self.guarded_cycle().await {
            Ok(measurement) => {
                if measurement > 0.0 {
                    state.reset_errors();
                }
                (measurement, self.scheduler.next_interval(measurement))
            }
            Err(e) => {
                error!(error = %e, "Unrecoverable error in polling cycle");
                self.ctx
                    .notify(&format!("Unrecoverable error: {e}"), Severity::Error);
                let errors = state.record_error();

                if errors >= limits.max_consecutive_errors {
                    warn!(consecutive_errors = errors, "Too many consecutive errors, pausing");
                    self.ctx
                        .notify("Too many errors - pausing for 10 minutes", Severity::Warn);
                    if !state.is_shutting_down() {
                        if let Err(e) = self.browser.restart_now().await {
                            error!(error = %e, "Browser restart during pause failed");
                        }
                    }
                    (0.0, self.ctx.timings.error_pause)
                } else {
                    (0.0, self.scheduler.next_interval(0.0))
                }
            }
        };

        if CycleStage::Reporting.enter(state).is_ok() {
            let secs = next_interval.as_secs();
            if measurement != 0.0 {
                info!(available_gb = measurement, next_check_secs = secs, "Measurement complete");
                self.ctx.notify(
                    &format!("{measurement} GB available, next check in {secs} s"),
                    Severity::Info,
                );
            } else {
                warn!(next_check_secs = secs, "No usable measurement this cycle");
            }
        }

        CycleReport {
            measurement,
            next_interval,
        }
    }

    /// Inner failure layer. Only a failed restart escapes.
    async fn guarded_cycle(&self) -> Result<f64, CycleError> {
        let mut slot = self.browser.acquire().await;

        let e = match self.poll(&mut slot).await {
            Ok(result) => return Ok(result.scheduling_value()),
            Err(CycleError::ShuttingDown) => {
                info!("Cycle interrupted by shutdown");
                return Ok(0.0);
            }
            Err(e @ CycleError::CircuitOpen) => {
                // no browser action and no error count while the breaker cools down
                let breaker = self.breaker.snapshot().await;
                warn!(?breaker, "Cycle skipped, circuit open");
                self.ctx
                    .notify(&format!("Error while checking data volume: {e}"), Severity::Error);
                return Ok(0.0);
            }
            Err(e) => e,
        };

        error!(error = %e, "Polling cycle failed");
        self.ctx
            .notify(&format!("Error while checking data volume: {e}"), Severity::Error);
        let errors = self.ctx.state.record_error();

        if errors >= self.ctx.thresholds.cycle_restart_errors {
            warn!(consecutive_errors = errors, "Repeated cycle failures, restarting browser");
            self.browser.restart(&mut slot).await?;
        } else if e.is_browser_fault() {
            // dead page: drop it so the next cycle relaunches cleanly
            self.browser.close_safely(&mut slot).await;
        }
        Ok(0.0)
    }

    async fn poll(&self, slot: &mut SessionSlot) -> Result<PollResult, CycleError> {
        let state = &self.ctx.state;
        let timings = &self.ctx.timings;

        if self.breaker.rejects_now().await {
            return Err(CycleError::CircuitOpen);
        }

        CycleStage::EnsuringBrowser.enter(state)?;
        let live = match slot.session() {
            Some(session) => session.has_live_page().await,
            None => false,
        };
        if !live && !self.browser.initialize(slot).await {
            return Err(CycleError::BrowserFault(
                "Browser initialization failed".to_string(),
            ));
        }
        let session = slot
            .session()
            .ok_or_else(|| CycleError::BrowserFault("No browser session".to_string()))?;

        CycleStage::EnsuringSession.enter(state)?;
        self.ensure_session(session).await?;

        let url = session.current_url().await.unwrap_or_default();
        if !url.starts_with(OVERVIEW_URL) {
            debug!(%url, "Navigating to the overview page");
            with_deadline(
                "overview navigation",
                timings.navigation_timeout,
                session.goto(OVERVIEW_URL, timings.navigation_timeout),
            )
            .await?;
            tokio::time::sleep(timings.page_settle).await;
        }

        CycleStage::Measuring.enter(state)?;
        let mut result = self.breaker.execute(|| measure(&self.ctx, session)).await?;
        info!(
            used_gb = result.used_gb,
            total_gb = result.total_gb,
            refill_gb = ?result.refill_gb,
            available_gb = result.available_gb,
            "Data volume read"
        );

        CycleStage::TopUpDecision.enter(state)?;
        if result.available_gb.is_nan() {
            warn!("No usable data volume on the page, top-up not possible");
            self.ctx.notify(
                "Could not read the data volume, no top-up possible",
                Severity::Error,
            );
        } else if result.needs_top_up() {
            self.top_up(session, &mut result).await;
        }

        self.ctx.persist_activity().await;
        Ok(result)
    }

    async fn ensure_session(&self, session: &dyn BrowserSession) -> Result<(), CycleError> {
        let store = &self.ctx.store;

        let reusable = store.credentials_exist().await
            && !self
                .sessions
                .is_expired(store.load().await.as_ref(), Utc::now());
        if reusable && self.sessions.validate(session).await {
            debug!("Reusing stored session");
            return Ok(());
        }

        info!("Session invalid or expired, logging in");
        if let Err(e) = store.clear().await {
            warn!(error = %e, "Could not clear stale session data");
        }
        if self.sessions.login(session).await {
            Ok(())
        } else {
            Err(CycleError::LoginFailed("Login failed".to_string()))
        }
    }

    async fn top_up(&self, session: &dyn BrowserSession, result: &mut PollResult) {
        info!(available_gb = result.available_gb, "Below 1 GB, attempting top-up");
        result.top_up_attempted = true;

        match session.attempt_top_up().await {
            Ok(true) => {
                result.top_up_succeeded = true;
                result.available_gb = round3(result.available_gb + TOP_UP_VOLUME_GB);
                info!(available_gb = result.available_gb, "Top-up confirmed");
                self.ctx.notify(
                    &format!(
                        "Top-up successful! Available data volume: {} GB",
                        result.available_gb
                    ),
                    Severity::Info,
                );
            }
            Ok(false) => {
                warn!("Top-up was not confirmed");
                self.ctx
                    .notify("Top-up failed, please book manually", Severity::Error);
            }
            Err(e) => {
                error!(error = %e, "Top-up failed");
                self.ctx
                    .notify("Top-up failed, please book manually", Severity::Error);
            }
        }
    }
}

async fn measure(
    ctx: &AppContext,
    session: &dyn BrowserSession,
) -> Result<PollResult, CycleError> {
    let usage = session.fetch_usage().await?;
    let refill = match session.fetch_refill().await {
        Ok(refill) => refill,
        Err(e) => {
            warn!(error = %e, "Could not read refill volume");
            ctx.notify("Could not read the refill volume", Severity::Warn);
            None
        }
    };
    if refill.is_none() {
        debug!("No refill block on the page");
    }
    Ok(PollResult::from_readings(&usage, refill.as_ref()))
}
