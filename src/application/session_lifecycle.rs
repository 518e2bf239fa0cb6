//! Portal session: freshness, validation, login and keep-alive
//!
//! None of these operations raise past this module. Each degrades to a
//! `bool` (or [`KeepAlive`]) plus a log line and adjusts the shared counters.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::context::AppContext;
use crate::application::deadline::{sleep_or_cancel, with_deadline};
use crate::domain::constants::portal::{
    LOGIN_URL, LOGIN_URL_MARKERS, OVERVIEW_URL, PASSWORD_INPUT, SUBMIT_BUTTON, USAGE_BLOCK,
    USERNAME_INPUT,
};
use crate::domain::errors::CycleError;
use crate::domain::services::BrowserSession;
use crate::domain::session_meta::{FreshnessPolicy, SessionMeta};
use crate::infrastructure::config::PortalCredentials;

/// Result of one keep-alive ping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    Refreshed,
    Failed,
    /// Enough failures piled up that the browser should be restarted
    RestartRequested,
}

pub struct SessionLifecycle {
    ctx: Arc<AppContext>,
    credentials: PortalCredentials,
}

impl SessionLifecycle {
    pub fn new(ctx: Arc<AppContext>, credentials: PortalCredentials) -> Self {
        Self { ctx, credentials }
    }

    pub fn is_expired(&self, meta: Option<&SessionMeta>, now: DateTime<Utc>) -> bool {
        FreshnessPolicy {
            session_timeout: self.ctx.timings.session_timeout,
            browser_restart_interval: self.ctx.timings.browser_restart_interval,
        }
        .is_expired(meta, now)
    }

    /// Whether the stored session still works against the live portal
    pub async fn validate(&self, session: &dyn BrowserSession) -> bool {
        if self.ctx.state.is_shutting_down() {
            return false;
        }
        if !session.has_live_page().await {
            warn!("Page is closed, session invalid");
            return false;
        }

        let timings = &self.ctx.timings;
        let outcome = with_deadline("session validation", timings.validation_timeout, async {
            let url = session.current_url().await?;
            if LOGIN_URL_MARKERS.iter().any(|marker| url.contains(marker)) {
                warn!(%url, "Redirected to login page, session invalid");
                return Ok::<_, CycleError>(false);
            }

            with_deadline(
                "overview load",
                timings.page_load_timeout,
                session.goto(OVERVIEW_URL, timings.page_load_timeout),
            )
            .await?;
            tokio::time::sleep(timings.page_settle).await;

            if session.element_exists(USERNAME_INPUT).await? {
                warn!("Login form present, session invalid");
                return Ok(false);
            }
            session
                .wait_for(USAGE_BLOCK, timings.usage_indicator_timeout)
                .await?;
            Ok(true)
        })
        .await;

        match outcome {
            Ok(true) => {
                info!("Session validation successful");
                self.ctx.persist_activity().await;
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(error = %e, "Session validation failed");
                false
            }
        }
    }

    /// Log in through the portal form
    pub async fn login(&self, session: &dyn BrowserSession) -> bool {
        let state = &self.ctx.state;
        if state.is_shutting_down() {
            return false;
        }

        if on_overview(session).await {
            info!("Already on the overview page, no login needed");
            return true;
        }

        let limits = &self.ctx.thresholds;
        let attempt = state.begin_login_attempt();
        let result = if attempt > limits.max_login_attempts {
            Err(CycleError::LoginFailed(format!(
                "maximum number of login attempts ({}) reached",
                limits.max_login_attempts
            )))
        } else {
            info!(attempt, max = limits.max_login_attempts, "Login attempt");
            with_deadline("login", self.ctx.timings.login_timeout, self.submit_login(session)).await
        };

        match result {
            Ok(()) => {
                self.ctx.persist_activity().await;
                state.reset_login_attempts();
                state.reset_errors();
                info!("Login successful, session data saved");
                true
            }
            Err(e) => {
                let errors = state.record_error();
                error!(error = %e, attempt, consecutive_errors = errors, "Login failed");
                if attempt >= limits.login_cooldown_attempts {
                    info!(
                        cooldown = ?self.ctx.timings.login_cooldown,
                        "Waiting before the next login attempt"
                    );
                    sleep_or_cancel(state.shutdown_token(), self.ctx.timings.login_cooldown).await;
                }
                false
            }
        }
    }

    async fn submit_login(&self, session: &dyn BrowserSession) -> Result<(), CycleError> {
        let timings = &self.ctx.timings;

        with_deadline(
            "login page",
            timings.navigation_timeout,
            session.goto(LOGIN_URL, timings.navigation_timeout),
        )
        .await?;
        tokio::time::sleep(timings.page_settle).await;

        for selector in [USERNAME_INPUT, PASSWORD_INPUT] {
            session.wait_for(selector, timings.form_control_timeout).await?;
        }

        // stale autofill would be appended to
        session.clear_field(USERNAME_INPUT).await?;
        session.clear_field(PASSWORD_INPUT).await?;
        tokio::time::sleep(timings.form_settle).await;

        session
            .fill_field(USERNAME_INPUT, &self.credentials.phone_number)
            .await?;
        session
            .fill_field(PASSWORD_INPUT, &self.credentials.password)
            .await?;
        info!("Credentials entered, submitting form");

        with_deadline(
            "login submit",
            timings.login_navigation_timeout,
            session.submit_and_wait(SUBMIT_BUTTON, timings.login_navigation_timeout),
        )
        .await?;
        tokio::time::sleep(timings.post_login_settle).await;

        if !on_overview(session).await {
            let url = session.current_url().await.unwrap_or_default();
            return Err(CycleError::LoginFailed(format!("still not on the overview page: {url}")));
        }

        session
            .save_credentials(self.ctx.store.credentials_path())
            .await?;
        Ok(())
    }

    /// Reload the current page to keep the portal session warm
    pub async fn keep_alive(&self, session: &dyn BrowserSession) -> KeepAlive {
        let timings = &self.ctx.timings;
        let result = with_deadline(
            "keep-alive",
            timings.keep_alive_timeout,
            session.reload(timings.page_load_timeout),
        )
        .await;

        match result {
            Ok(()) => {
                self.ctx.persist_activity().await;
                info!("Session keep-alive successful");
                KeepAlive::Refreshed
            }
            Err(e) => {
                let errors = self.ctx.state.record_error();
                warn!(error = %e, consecutive_errors = errors, "Keep-alive failed");
                if errors >= self.ctx.thresholds.keep_alive_restart_errors {
                    error!("Repeated keep-alive failures, browser restart requested");
                    KeepAlive::RestartRequested
                } else {
                    KeepAlive::Failed
                }
            }
        }
    }
}

/// On the overview URL with no login form showing.
/// The portal serves its login form under the overview address.
async fn on_overview(session: &dyn BrowserSession) -> bool {
    match session.current_url().await {
        Ok(url) if url.starts_with(OVERVIEW_URL) => {
            matches!(session.element_exists(USERNAME_INPUT).await, Ok(false))
        }
        _ => false,
    }
}
