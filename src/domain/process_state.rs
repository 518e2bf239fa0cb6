//! Process-wide counters shared by the main loop and the background tasks

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;

/// Counters and the shutdown flag, lifetime = process lifetime
#[derive(Debug)]
pub struct ProcessState {
    login_attempts: AtomicU32,
    consecutive_errors: AtomicU32,
    last_browser_restart_ms: AtomicI64,
    last_activity_ms: AtomicI64,
    shutdown: CancellationToken,
}

impl ProcessState {
    pub fn new() -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            login_attempts: AtomicU32::new(0),
            consecutive_errors: AtomicU32::new(0),
            last_browser_restart_ms: AtomicI64::new(now),
            last_activity_ms: AtomicI64::new(now),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn login_attempts(&self) -> u32 {
        self.login_attempts.load(Ordering::SeqCst)
    }

    /// Count a login attempt, returning the new total
    pub fn begin_login_attempt(&self) -> u32 {
        self.login_attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_login_attempts(&self) {
        self.login_attempts.store(0, Ordering::SeqCst);
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    /// Count an error, returning the new total
    pub fn record_error(&self) -> u32 {
        self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_errors(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
    }

    pub fn last_browser_restart(&self) -> DateTime<Utc> {
        from_millis(self.last_browser_restart_ms.load(Ordering::SeqCst))
    }

    pub fn mark_browser_restart(&self, at: DateTime<Utc>) {
        self.last_browser_restart_ms.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        from_millis(self.last_activity_ms.load(Ordering::SeqCst))
    }

    pub fn touch_activity(&self, at: DateTime<Utc>) {
        self.last_activity_ms.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    /// Token cancelled exactly once when shutdown begins
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}
