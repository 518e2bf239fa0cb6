//! Scripted fakes for the browser, notifier and memory probe

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::application::{
    AppContext, BackgroundTasks, BrowserLifecycle, PollingOrchestrator, SessionLifecycle,
};
use crate::domain::constants::portal::{OVERVIEW_URL, PASSWORD_INPUT, USAGE_BLOCK, USERNAME_INPUT};
use crate::domain::errors::DriverError;
use crate::domain::process_state::ProcessState;
use crate::domain::scheduler::{AdaptiveScheduler, SleepMode};
use crate::domain::services::{
    BrowserLauncher, BrowserSession, LaunchSpec, MemoryProbe, Notifier, Severity, UpdateSource,
};
use crate::domain::session_meta::MemorySample;
use crate::domain::tuning::{Thresholds, Timings};
use crate::domain::usage::Measurement;
use crate::infrastructure::config::PortalCredentials;
use crate::infrastructure::session_store::SessionStore;

const REJECTED_LOGIN_URL: &str = "https://kundenkonto.lidl-connect.de/login?error=credentials";

/// How long a hung navigation blocks, well past every driver deadline
const HANG: Duration = Duration::from_secs(3600);

struct PageState {
    url: String,
    live: bool,
    logged_in: bool,
    cookies_valid: bool,
    credentials_accepted: bool,
    reload_fails: bool,
    refill_fails: bool,
    hang_navigation: bool,
    hang_submit: bool,
    usage: Option<Measurement>,
    refill: Option<Measurement>,
    top_up: Result<bool, DriverError>,
    filled: Vec<(String, String)>,
}

/// Shared portal behind every [`FakeSession`]
pub struct FakePortal {
    page: Mutex<PageState>,
    submits: AtomicU32,
    cleared: AtomicU32,
    reloads: AtomicU32,
    usage_reads: AtomicU32,
    top_up_calls: AtomicU32,
    restores: AtomicU32,
    page_closes: AtomicU32,
    context_closes: AtomicU32,
}

impl FakePortal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            page: Mutex::new(PageState {
                url: "about:blank".to_string(),
                live: true,
                logged_in: false,
                cookies_valid: false,
                credentials_accepted: true,
                reload_fails: false,
                refill_fails: false,
                hang_navigation: false,
                hang_submit: false,
                usage: Some(Measurement::new(2.5, 10.0, "GB")),
                refill: None,
                top_up: Ok(true),
                filled: Vec::new(),
            }),
            submits: AtomicU32::new(0),
            cleared: AtomicU32::new(0),
            reloads: AtomicU32::new(0),
            usage_reads: AtomicU32::new(0),
            top_up_calls: AtomicU32::new(0),
            restores: AtomicU32::new(0),
            page_closes: AtomicU32::new(0),
            context_closes: AtomicU32::new(0),
        })
    }

    fn page(&self) -> MutexGuard<'_, PageState> {
        self.page.lock().unwrap()
    }

    fn reset_page(&self) {
        let mut page = self.page();
        page.url = "about:blank".to_string();
        page.live = true;
        page.logged_in = false;
    }

    pub fn set_usage(&self, usage: Option<Measurement>) {
        self.page().usage = usage;
    }

    pub fn set_refill(&self, refill: Option<Measurement>) {
        self.page().refill = refill;
    }

    pub fn set_top_up(&self, outcome: Result<bool, DriverError>) {
        self.page().top_up = outcome;
    }

    pub fn set_cookies_valid(&self, valid: bool) {
        self.page().cookies_valid = valid;
    }

    pub fn set_credentials_accepted(&self, accepted: bool) {
        self.page().credentials_accepted = accepted;
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.page().logged_in = logged_in;
    }

    pub fn set_live(&self, live: bool) {
        self.page().live = live;
    }

    pub fn set_reload_fails(&self, fails: bool) {
        self.page().reload_fails = fails;
    }

    pub fn set_refill_fails(&self, fails: bool) {
        self.page().refill_fails = fails;
    }

    /// Navigations and form submits never complete
    pub fn set_hang(&self, hang: bool) {
        let mut page = self.page();
        page.hang_navigation = hang;
        page.hang_submit = hang;
    }

    /// Only the login submit never completes
    pub fn set_submit_hangs(&self, hang: bool) {
        self.page().hang_submit = hang;
    }

    pub fn filled(&self) -> Vec<(String, String)> {
        self.page().filled.clone()
    }

    pub fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn cleared(&self) -> u32 {
        self.cleared.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> u32 {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn usage_reads(&self) -> u32 {
        self.usage_reads.load(Ordering::SeqCst)
    }

    pub fn top_up_calls(&self) -> u32 {
        self.top_up_calls.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> u32 {
        self.restores.load(Ordering::SeqCst)
    }

    pub fn page_closes(&self) -> u32 {
        self.page_closes.load(Ordering::SeqCst)
    }

    pub fn context_closes(&self) -> u32 {
        self.context_closes.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    portal: Arc<FakePortal>,
}

impl FakeSession {
    pub fn new(portal: Arc<FakePortal>) -> Self {
        Self { portal }
    }

    fn live_page(&self) -> Result<MutexGuard<'_, PageState>, DriverError> {
        let page = self.portal.page();
        if page.live {
            Ok(page)
        } else {
            Err(DriverError::PageClosed)
        }
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn has_live_page(&self) -> bool {
        self.portal.page().live
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.live_page()?.url.clone())
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        let hang = self.portal.page().hang_navigation;
        if hang {
            tokio::time::sleep(HANG).await;
        }
        self.live_page()?.url = url.to_string();
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<(), DriverError> {
        self.portal.reloads.fetch_add(1, Ordering::SeqCst);
        let page = self.live_page()?;
        if page.reload_fails {
            return Err(DriverError::Navigation {
                url: page.url.clone(),
                message: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        Ok(())
    }

    async fn element_exists(&self, selector: &str) -> Result<bool, DriverError> {
        let page = self.live_page()?;
        Ok(match selector {
            USERNAME_INPUT | PASSWORD_INPUT => !page.logged_in,
            USAGE_BLOCK => page.logged_in,
            _ => false,
        })
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<(), DriverError> {
        if self.element_exists(selector).await? {
            Ok(())
        } else {
            Err(DriverError::ElementMissing {
                selector: selector.to_string(),
                message: "waiting failed".to_string(),
            })
        }
    }

    async fn clear_field(&self, _selector: &str) -> Result<(), DriverError> {
        self.live_page()?;
        self.portal.cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fill_field(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        self.live_page()?
            .filled
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn submit_and_wait(&self, _selector: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.portal.submits.fetch_add(1, Ordering::SeqCst);
        let hang = self.portal.page().hang_submit;
        if hang {
            tokio::time::sleep(HANG).await;
        }
        let mut page = self.live_page()?;
        if page.credentials_accepted {
            page.logged_in = true;
            page.url = OVERVIEW_URL.to_string();
        } else {
            page.url = REJECTED_LOGIN_URL.to_string();
        }
        Ok(())
    }

    async fn fetch_usage(&self) -> Result<Measurement, DriverError> {
        self.portal.usage_reads.fetch_add(1, Ordering::SeqCst);
        self.live_page()?
            .usage
            .clone()
            .ok_or_else(|| DriverError::ElementMissing {
                selector: USAGE_BLOCK.to_string(),
                message: "no usage block".to_string(),
            })
    }

    async fn fetch_refill(&self) -> Result<Option<Measurement>, DriverError> {
        let page = self.live_page()?;
        if page.refill_fails {
            return Err(DriverError::Protocol("refill block detached".to_string()));
        }
        Ok(page.refill.clone())
    }

    async fn attempt_top_up(&self) -> Result<bool, DriverError> {
        self.portal.top_up_calls.fetch_add(1, Ordering::SeqCst);
        self.live_page()?.top_up.clone()
    }

    async fn restore_credentials(&self, _path: &Path) -> Result<(), DriverError> {
        self.portal.restores.fetch_add(1, Ordering::SeqCst);
        let mut page = self.live_page()?;
        page.logged_in = page.cookies_valid;
        Ok(())
    }

    async fn save_credentials(&self, path: &Path) -> Result<(), DriverError> {
        std::fs::write(path, "[]").map_err(|e| DriverError::Credentials(e.to_string()))
    }

    async fn close_page(&self) -> Result<(), DriverError> {
        self.portal.page_closes.fetch_add(1, Ordering::SeqCst);
        self.portal.page().live = false;
        Ok(())
    }

    async fn close_context(&self) -> Result<(), DriverError> {
        self.portal.context_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    portal: Arc<FakePortal>,
    launches: AtomicU32,
    fail: AtomicBool,
}

impl FakeLauncher {
    pub fn new(portal: Arc<FakePortal>) -> Arc<Self> {
        Arc::new(Self {
            portal,
            launches: AtomicU32::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn fail_launches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Successful launches so far
    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _spec: &LaunchSpec) -> Result<Box<dyn BrowserSession>, DriverError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DriverError::Launch("chrome exited with status 127".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.portal.reset_page();
        Ok(Box::new(FakeSession::new(Arc::clone(&self.portal))))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, Severity)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        self.sent.lock().unwrap().push((message.to_string(), severity));
    }

    async fn flush(&self, _timeout: Duration) {}
}

#[derive(Default)]
pub struct FixedProbe {
    rss: AtomicU64,
}

impl FixedProbe {
    pub fn set_rss(&self, megabytes: u64) {
        self.rss.store(megabytes, Ordering::SeqCst);
    }
}

impl MemoryProbe for FixedProbe {
    fn sample(&self) -> MemorySample {
        let rss = self.rss.load(Ordering::SeqCst);
        MemorySample {
            rss,
            heap_used: rss,
            heap_total: rss,
            external: 0,
        }
    }

    fn request_collection(&self) -> bool {
        false
    }
}

/// Counts version checks and cancels the token once `stop_after` is reached
pub struct CountingUpdates {
    checks: AtomicU32,
    stop_after: u32,
    token: CancellationToken,
}

impl CountingUpdates {
    pub fn new(stop_after: u32, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            checks: AtomicU32::new(0),
            stop_after,
            token,
        })
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpdateSource for CountingUpdates {
    async fn check(&self, _notifier: &dyn Notifier) -> Option<String> {
        let checks = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        if checks >= self.stop_after {
            self.token.cancel();
        }
        None
    }
}

pub fn test_credentials() -> PortalCredentials {
    PortalCredentials {
        phone_number: "015712345678".to_string(),
        password: "secret".to_string(),
    }
}

/// Everything wired against the fakes with default tunings
pub struct TestHarness {
    _dir: TempDir,
    pub ctx: Arc<AppContext>,
    pub portal: Arc<FakePortal>,
    pub launcher: Arc<FakeLauncher>,
    pub notifier: Arc<RecordingNotifier>,
    pub probe: Arc<FixedProbe>,
    pub browser: Arc<BrowserLifecycle>,
    pub sessions: Arc<SessionLifecycle>,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        std::fs::create_dir_all(&state_dir).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let probe = Arc::new(FixedProbe::default());
        probe.set_rss(120);

        let ctx = Arc::new(AppContext {
            state: Arc::new(ProcessState::new()),
            timings: Timings::default(),
            thresholds: Thresholds::default(),
            store: SessionStore::new(&state_dir),
            notifier: notifier.clone(),
            probe: probe.clone(),
        });

        let portal = FakePortal::new();
        let launcher = FakeLauncher::new(Arc::clone(&portal));
        let browser = Arc::new(BrowserLifecycle::new(
            Arc::clone(&ctx),
            launcher.clone(),
            None,
        ));
        let sessions = Arc::new(SessionLifecycle::new(Arc::clone(&ctx), test_credentials()));

        Self {
            _dir: dir,
            ctx,
            portal,
            launcher,
            notifier,
            probe,
            browser,
            sessions,
        }
    }

    pub fn orchestrator(&self, mode: SleepMode) -> PollingOrchestrator {
        self.orchestrator_with_updates(mode, None)
    }

    pub fn orchestrator_with_updates(
        &self,
        mode: SleepMode,
        updates: Option<Arc<dyn UpdateSource>>,
    ) -> PollingOrchestrator {
        PollingOrchestrator::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.browser),
            Arc::clone(&self.sessions),
            AdaptiveScheduler::new(mode),
            updates,
        )
    }

    pub fn background(&self) -> Arc<BackgroundTasks> {
        BackgroundTasks::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.browser),
            Arc::clone(&self.sessions),
        )
    }

    pub fn notices(&self) -> Vec<(String, Severity)> {
        self.notifier.sent()
    }
}
