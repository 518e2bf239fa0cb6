//! Browser lifecycle: launch, restart and safe close
//!
//! The browser handle lives in a [`SessionSlot`] behind an async mutex. The
//! polling cycle, keep-alive and restarts all take the lock, so at most one of
//! them drives the page at any time.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::application::context::AppContext;
use crate::domain::errors::CycleError;
use crate::domain::services::{BrowserLauncher, BrowserSession, LaunchSpec, Severity};

/// The single browser handle, empty while nothing is running
#[derive(Default)]
pub struct SessionSlot {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionSlot {
    pub fn session(&self) -> Option<&dyn BrowserSession> {
        self.session.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_none()
    }

    fn take(&mut self) -> Option<Box<dyn BrowserSession>> {
        self.session.take()
    }

    fn replace(&mut self, session: Box<dyn BrowserSession>) {
        self.session = Some(session);
    }
}

pub struct BrowserLifecycle {
    ctx: Arc<AppContext>,
    launcher: Arc<dyn BrowserLauncher>,
    chrome_path: Option<PathBuf>,
    slot: Mutex<SessionSlot>,
}

impl BrowserLifecycle {
    pub fn new(
        ctx: Arc<AppContext>,
        launcher: Arc<dyn BrowserLauncher>,
        chrome_path: Option<PathBuf>,
    ) -> Self {
        Self {
            ctx,
            launcher,
            chrome_path,
            slot: Mutex::new(SessionSlot::default()),
        }
    }

    /// Wait for exclusive use of the browser
    pub async fn acquire(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().await
    }

    /// Exclusive use of the browser if nobody else holds it
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, SessionSlot>> {
        self.slot.try_lock().ok()
    }

    /// Launch a fresh browser into `slot`, replacing whatever was there.
    ///
    /// Restores the credential artifact when one exists. Returns `false` on
    /// failure after counting the error.
    pub async fn initialize(&self, slot: &mut SessionSlot) -> bool {
        let state = &self.ctx.state;
        if state.is_shutting_down() {
            return false;
        }

        info!("Initializing browser");
        self.close_safely(slot).await;

        let errors = state.consecutive_errors();
        if errors >= self.ctx.thresholds.profile_wipe_errors {
            warn!(consecutive_errors = errors, "Wiping browser profile after repeated errors");
            if let Err(e) = self.ctx.store.wipe_profile().await {
                warn!(error = %e, "Could not wipe browser profile");
            }
        }

        let spec = LaunchSpec::standard(self.ctx.store.profile_dir(), self.chrome_path.clone());
        let session = match self.launcher.launch(&spec).await {
            Ok(session) => session,
            Err(e) => {
                let errors = state.record_error();
                error!(error = %e, consecutive_errors = errors, "Browser initialization failed");
                return false;
            }
        };

        if self.ctx.store.credentials_exist().await {
            match session
                .restore_credentials(self.ctx.store.credentials_path())
                .await
            {
                Ok(()) => info!("Saved cookies loaded"),
                Err(e) => warn!(error = %e, "Could not load saved cookies"),
            }
        }

        slot.replace(session);
        info!("Browser initialized");
        true
    }

    /// Close and relaunch. The caller holds the lock.
    pub async fn restart(&self, slot: &mut SessionSlot) -> Result<(), CycleError> {
        let state = &self.ctx.state;
        info!("Restarting browser");

        self.close_safely(slot).await;
        tokio::time::sleep(self.ctx.timings.restart_settle).await;

        if self.initialize(slot).await {
            state.mark_browser_restart(Utc::now());
            state.reset_errors();
            // a fresh browser gets a fresh set of login attempts
            state.reset_login_attempts();
            info!("Browser restart successful");
            self.ctx.notify("Browser was restarted", Severity::Info);
            Ok(())
        } else {
            let errors = state.record_error();
            error!(consecutive_errors = errors, "Browser restart failed");
            Err(CycleError::BrowserFault("Browser restart failed".to_string()))
        }
    }

    /// Take the lock and restart
    pub async fn restart_now(&self) -> Result<(), CycleError> {
        let mut slot = self.acquire().await;
        self.restart(&mut slot).await
    }

    /// Release the page and then the browser context.
    ///
    /// Each step fails independently and is only logged. Safe to call on an
    /// empty slot.
    pub async fn close_safely(&self, slot: &mut SessionSlot) {
        let Some(session) = slot.take() else {
            return;
        };

        if let Err(e) = session.close_page().await {
            warn!(error = %e, "Error while closing page");
        }
        if let Err(e) = session.close_context().await {
            warn!(error = %e, "Error while closing browser context");
        }
    }

    /// Take the lock and close
    pub async fn close(&self) {
        let mut slot = self.acquire().await;
        self.close_safely(&mut slot).await;
    }
}
