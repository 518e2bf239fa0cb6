//! Timings and thresholds of the resilience layer
//!
//! Defaults come from [`crate::domain::constants`]; components receive these
//! structs instead of reading the constants directly.

use std::time::Duration;

use crate::domain::constants::{thresholds, timing};

/// Every bounded wait and periodic interval used by the poller
#[derive(Debug, Clone)]
pub struct Timings {
    pub session_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub browser_restart_interval: Duration,
    pub memory_check_interval: Duration,
    pub validation_timeout: Duration,
    pub login_timeout: Duration,
    pub page_load_timeout: Duration,
    pub navigation_timeout: Duration,
    pub form_control_timeout: Duration,
    pub usage_indicator_timeout: Duration,
    pub login_navigation_timeout: Duration,
    pub keep_alive_timeout: Duration,
    pub login_cooldown: Duration,
    pub restart_settle: Duration,
    pub page_settle: Duration,
    pub form_settle: Duration,
    pub post_login_settle: Duration,
    pub error_pause: Duration,
    pub shutdown_settle: Duration,
    pub shutdown_close_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(timing::SESSION_TIMEOUT_SECS),
            keep_alive_interval: Duration::from_secs(timing::KEEP_ALIVE_INTERVAL_SECS),
            browser_restart_interval: Duration::from_secs(timing::BROWSER_RESTART_INTERVAL_SECS),
            memory_check_interval: Duration::from_secs(timing::MEMORY_CHECK_INTERVAL_SECS),
            validation_timeout: Duration::from_secs(timing::VALIDATION_TIMEOUT_SECS),
            login_timeout: Duration::from_secs(timing::LOGIN_TIMEOUT_SECS),
            page_load_timeout: Duration::from_secs(timing::PAGE_LOAD_TIMEOUT_SECS),
            navigation_timeout: Duration::from_secs(timing::NAVIGATION_TIMEOUT_SECS),
            form_control_timeout: Duration::from_secs(timing::FORM_CONTROL_TIMEOUT_SECS),
            usage_indicator_timeout: Duration::from_secs(timing::USAGE_INDICATOR_TIMEOUT_SECS),
            login_navigation_timeout: Duration::from_secs(timing::LOGIN_NAVIGATION_TIMEOUT_SECS),
            keep_alive_timeout: Duration::from_secs(timing::KEEP_ALIVE_TIMEOUT_SECS),
            login_cooldown: Duration::from_secs(timing::LOGIN_COOLDOWN_SECS),
            restart_settle: Duration::from_secs(timing::RESTART_SETTLE_SECS),
            page_settle: Duration::from_secs(timing::PAGE_SETTLE_SECS),
            form_settle: Duration::from_secs(timing::FORM_SETTLE_SECS),
            post_login_settle: Duration::from_secs(timing::POST_LOGIN_SETTLE_SECS),
            error_pause: Duration::from_secs(timing::ERROR_PAUSE_SECS),
            shutdown_settle: Duration::from_secs(timing::SHUTDOWN_SETTLE_SECS),
            shutdown_close_timeout: Duration::from_secs(timing::SHUTDOWN_CLOSE_TIMEOUT_SECS),
        }
    }
}

/// Failure counts and limits that trigger escalation
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub max_login_attempts: u32,
    pub max_consecutive_errors: u32,
    pub circuit_cooldown: Duration,
    pub cycle_restart_errors: u32,
    pub keep_alive_restart_errors: u32,
    pub profile_wipe_errors: u32,
    pub login_cooldown_attempts: u32,
    pub max_memory_mb: u64,
    pub critical_memory_factor: f64,
}

impl Thresholds {
    /// Resident size above which the watchdog forces a restart
    pub fn critical_memory_mb(&self) -> u64 {
        (self.max_memory_mb as f64 * self.critical_memory_factor) as u64
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_login_attempts: thresholds::MAX_LOGIN_ATTEMPTS,
            max_consecutive_errors: thresholds::MAX_CONSECUTIVE_ERRORS,
            circuit_cooldown: Duration::from_secs(thresholds::CIRCUIT_COOLDOWN_SECS),
            cycle_restart_errors: thresholds::CYCLE_RESTART_ERRORS,
            keep_alive_restart_errors: thresholds::KEEP_ALIVE_RESTART_ERRORS,
            profile_wipe_errors: thresholds::PROFILE_WIPE_ERRORS,
            login_cooldown_attempts: thresholds::LOGIN_COOLDOWN_ATTEMPTS,
            max_memory_mb: thresholds::MAX_MEMORY_MB,
            critical_memory_factor: thresholds::CRITICAL_MEMORY_FACTOR,
        }
    }
}
