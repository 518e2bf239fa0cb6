//! Domain services
//!
//! Seams between the resilience core and the outside world: the page driver,
//! the notification channels, the memory probe and page event hooks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::domain::constants::browser::{LAUNCH_FLAGS, USER_AGENT};
use crate::domain::errors::DriverError;
use crate::domain::session_meta::MemorySample;
use crate::domain::usage::Measurement;

/// Everything needed to start one browser session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub user_agent: String,
    pub flags: Vec<String>,
    pub profile_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
}

impl LaunchSpec {
    /// Fixed identity and flag set, rooted at `profile_dir`
    pub fn standard(profile_dir: impl Into<PathBuf>, chrome_path: Option<PathBuf>) -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            flags: LAUNCH_FLAGS.iter().map(ToString::to_string).collect(),
            profile_dir: profile_dir.into(),
            chrome_path,
            headless: true,
        }
    }
}

/// One browser context with one page
///
/// Handles are owned by the browser lifecycle and only borrowed for a single
/// call; a concurrent restart may invalidate them.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Whether the page is still attached
    async fn has_live_page(&self) -> bool;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn reload(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Immediate presence check, no waiting
    async fn element_exists(&self, selector: &str) -> Result<bool, DriverError>;

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn clear_field(&self, selector: &str) -> Result<(), DriverError>;

    async fn fill_field(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    /// Click `selector` and wait until the resulting navigation settles
    async fn submit_and_wait(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Primary usage block of the overview page
    async fn fetch_usage(&self) -> Result<Measurement, DriverError>;

    /// Refill block, `None` when the page has none
    async fn fetch_refill(&self) -> Result<Option<Measurement>, DriverError>;

    /// Book one additional volume package; `true` only when confirmed
    async fn attempt_top_up(&self) -> Result<bool, DriverError>;

    async fn restore_credentials(&self, path: &Path) -> Result<(), DriverError>;

    async fn save_credentials(&self, path: &Path) -> Result<(), DriverError>;

    async fn close_page(&self) -> Result<(), DriverError>;

    async fn close_context(&self) -> Result<(), DriverError>;
}

/// Starts browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserSession>, DriverError>;
}

/// Notification severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Whether a message of this severity passes a `minimum` filter.
    /// Errors always pass.
    pub fn passes(self, minimum: Self) -> bool {
        self == Self::Error || self >= minimum
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Fire-and-forget message sink
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Queue a message; never blocks the caller on delivery
    fn notify(&self, message: &str, severity: Severity);

    /// Wait up to `timeout` for queued messages to go out
    async fn flush(&self, timeout: Duration);
}

/// Where newer releases are announced
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// The newer version, if one was published. Failures count as none.
    async fn check(&self, notifier: &dyn Notifier) -> Option<String>;
}

/// Samples this process's memory
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemorySample;

    /// Ask the runtime to release memory; `false` when unsupported
    fn request_collection(&self) -> bool;
}

/// Hooks for events raised by the page
pub trait PageObserver: Send + Sync {
    fn on_request(&self, method: &str, url: &str);

    fn on_response(&self, status: u32, url: &str);

    fn on_page_error(&self, message: &str);

    fn on_crash(&self);
}
