//! Headless Chrome page driver
//!
//! `headless_chrome` is synchronous, so every CDP call runs on the blocking
//! pool. Callers bound each call with their own deadline; the driver adds a
//! hard timeout so a stuck CDP call cannot pin the lifecycle lock forever.

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::{Map, Value};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::domain::constants::portal::{
    REFILL_BLOCK, TOP_UP_BUTTON, TOP_UP_CONFIRMATION, USAGE_BLOCK,
};
use crate::domain::constants::timing::{TOP_UP_CLICK_TIMEOUT_SECS, TOP_UP_CONFIRM_DELAY_SECS};
use crate::domain::errors::DriverError;
use crate::domain::services::{BrowserLauncher, BrowserSession, LaunchSpec, PageObserver};
use crate::domain::usage::Measurement;
use crate::infrastructure::usage_parser::parse_usage_block;

/// Polling cycles can be an hour apart; the browser must outlive that idle time
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Hard limit for calls that carry no timeout of their own
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time granted on top of a caller's timeout before giving up on the
/// blocking task
const HARD_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Cookie fields that may be replayed into `Network.setCookies`
const COOKIE_PARAM_FIELDS: &[&str] = &[
    "name", "value", "domain", "path", "secure", "httpOnly", "sameSite", "expires",
];

pub struct ChromeLauncher {
    observer: Arc<dyn PageObserver>,
}

impl ChromeLauncher {
    pub fn new(observer: Arc<dyn PageObserver>) -> Self {
        Self { observer }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserSession>, DriverError> {
        let spec = spec.clone();
        let observer = Arc::clone(&self.observer);
        info!(profile = %spec.profile_dir.display(), "Launching headless Chrome");
        let session =
            blocking(CALL_TIMEOUT * 2, move || ChromeSession::start(&spec, observer)).await?;
        Ok(Box::new(session))
    }
}

/// One browser process with a single tab
pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    tab: Mutex<Option<Arc<Tab>>>,
}

impl ChromeSession {
    fn start(spec: &LaunchSpec, observer: Arc<dyn PageObserver>) -> Result<Self, DriverError> {
        std::fs::create_dir_all(&spec.profile_dir).map_err(|e| {
            DriverError::Launch(format!("profile dir {}: {e}", spec.profile_dir.display()))
        })?;

        let args: Vec<&OsStr> = spec.flags.iter().map(OsStr::new).collect();
        let options = LaunchOptions::default_builder()
            .headless(spec.headless)
            .sandbox(false)
            .path(spec.chrome_path.clone())
            .user_data_dir(Some(spec.profile_dir.clone()))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(args)
            .build()
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| DriverError::Launch(format!("{e:#}")))?;
        let tab = browser
            .new_tab()
            .map_err(|e| DriverError::Launch(format!("new tab: {e:#}")))?;
        tab.set_user_agent(&spec.user_agent, None, None)
            .map_err(|e| DriverError::Launch(format!("user agent: {e:#}")))?;

        if let Err(e) = tab.enable_runtime() {
            warn!(error = %format!("{e:#}"), "Runtime events unavailable");
        }
        let listener = move |event: &Event| dispatch_event(observer.as_ref(), event);
        if let Err(e) = tab.add_event_listener(Arc::new(listener)) {
            warn!(error = %format!("{e:#}"), "Could not attach page event listener");
        }

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            tab: Mutex::new(Some(tab)),
        })
    }

    fn tab(&self) -> Result<Arc<Tab>, DriverError> {
        self.tab
            .lock()
            .map_err(|_| DriverError::Protocol("tab lock poisoned".into()))?
            .clone()
            .ok_or(DriverError::PageClosed)
    }

    async fn page_html(&self) -> Result<String, DriverError> {
        let tab = self.tab()?;
        blocking(CALL_TIMEOUT, move || {
            tab.get_content()
                .map_err(|e| DriverError::Protocol(format!("read page: {e:#}")))
        })
        .await
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn has_live_page(&self) -> bool {
        let Ok(tab) = self.tab() else {
            return false;
        };
        blocking(CALL_TIMEOUT, move || {
            tab.evaluate("1", false)
                .map(|_| ())
                .map_err(|e| DriverError::Protocol(format!("{e:#}")))
        })
        .await
        .is_ok()
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let tab = self.tab()?;
        blocking(CALL_TIMEOUT, move || Ok(tab.get_url())).await
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        let tab = self.tab()?;
        let url = url.to_string();
        debug!(%url, "Navigating");
        blocking(timeout, move || {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| DriverError::Navigation {
                    url,
                    message: format!("{e:#}"),
                })
        })
        .await
    }

    async fn reload(&self, timeout: Duration) -> Result<(), DriverError> {
        let tab = self.tab()?;
        blocking(timeout, move || {
            tab.set_default_timeout(timeout);
            tab.reload(false, None)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| DriverError::Navigation {
                    url: tab.get_url(),
                    message: format!("reload: {e:#}"),
                })
        })
        .await
    }

    async fn element_exists(&self, selector: &str) -> Result<bool, DriverError> {
        let tab = self.tab()?;
        let selector = selector.to_string();
        blocking(CALL_TIMEOUT, move || Ok(tab.find_element(&selector).is_ok())).await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let tab = self.tab()?;
        let selector = selector.to_string();
        blocking(timeout, move || {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)
                .map(|_| ())
                .map_err(|e| DriverError::ElementMissing {
                    selector,
                    message: format!("{e:#}"),
                })
        })
        .await
    }

    async fn clear_field(&self, selector: &str) -> Result<(), DriverError> {
        let tab = self.tab()?;
        let selector = selector.to_string();
        blocking(CALL_TIMEOUT, move || {
            let element = tab
                .find_element(&selector)
                .map_err(|e| missing(&selector, &e))?;
            element
                .call_js_fn("function() { this.value = ''; }", vec![], false)
                .map(|_| ())
                .map_err(|e| DriverError::Protocol(format!("clear {selector}: {e:#}")))
        })
        .await
    }

    async fn fill_field(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let tab = self.tab()?;
        let selector = selector.to_string();
        let value = value.to_string();
        blocking(CALL_TIMEOUT, move || {
            let element = tab
                .find_element(&selector)
                .map_err(|e| missing(&selector, &e))?;
            element
                .click()
                .and_then(|element| element.type_into(&value))
                .map(|_| ())
                .map_err(|e| DriverError::Protocol(format!("fill {selector}: {e:#}")))
        })
        .await
    }

    async fn submit_and_wait(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let tab = self.tab()?;
        let selector = selector.to_string();
        blocking(timeout, move || {
            tab.set_default_timeout(timeout);
            let element = tab
                .find_element(&selector)
                .map_err(|e| missing(&selector, &e))?;
            element
                .click()
                .map_err(|e| DriverError::Protocol(format!("click {selector}: {e:#}")))?;
            tab.wait_until_navigated()
                .map(|_| ())
                .map_err(|e| DriverError::Navigation {
                    url: tab.get_url(),
                    message: format!("{e:#}"),
                })
        })
        .await
    }

    async fn fetch_usage(&self) -> Result<Measurement, DriverError> {
        let html = self.page_html().await?;
        parse_usage_block(&html, USAGE_BLOCK).ok_or_else(|| DriverError::ElementMissing {
            selector: USAGE_BLOCK.to_string(),
            message: "usage block not on page".into(),
        })
    }

    async fn fetch_refill(&self) -> Result<Option<Measurement>, DriverError> {
        let html = self.page_html().await?;
        Ok(parse_usage_block(&html, REFILL_BLOCK))
    }

    async fn attempt_top_up(&self) -> Result<bool, DriverError> {
        let click_timeout = Duration::from_secs(TOP_UP_CLICK_TIMEOUT_SECS);
        let tab = self.tab()?;
        blocking(click_timeout, move || {
            let button = tab
                .wait_for_element_with_custom_timeout(TOP_UP_BUTTON, click_timeout)
                .map_err(|e| missing(TOP_UP_BUTTON, &e))?;
            button
                .click()
                .map(|_| ())
                .map_err(|e| DriverError::Protocol(format!("click top-up: {e:#}")))
        })
        .await?;
        info!("Top-up button clicked, waiting for confirmation");

        tokio::time::sleep(Duration::from_secs(TOP_UP_CONFIRM_DELAY_SECS)).await;
        self.element_exists(TOP_UP_CONFIRMATION).await
    }

    async fn restore_credentials(&self, path: &Path) -> Result<(), DriverError> {
        let raw = fs::read(path)
            .await
            .map_err(|e| DriverError::Credentials(format!("read {}: {e}", path.display())))?;
        let cookies = cookie_params_from_snapshot(&raw)?;
        let count = cookies.len();
        let tab = self.tab()?;
        blocking(CALL_TIMEOUT, move || {
            tab.set_cookies(cookies)
                .map_err(|e| DriverError::Credentials(format!("set cookies: {e:#}")))
        })
        .await?;
        info!(count, "Restored cookies");
        Ok(())
    }

    async fn save_credentials(&self, path: &Path) -> Result<(), DriverError> {
        let tab = self.tab()?;
        let cookies = blocking(CALL_TIMEOUT, move || {
            tab.get_cookies()
                .map_err(|e| DriverError::Credentials(format!("get cookies: {e:#}")))
        })
        .await?;
        let json = serde_json::to_vec_pretty(&cookies)
            .map_err(|e| DriverError::Credentials(format!("encode cookies: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| DriverError::Credentials(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| DriverError::Credentials(format!("replace {}: {e}", path.display())))?;
        debug!(count = cookies.len(), "Cookies saved");
        Ok(())
    }

    async fn close_page(&self) -> Result<(), DriverError> {
        let tab = self
            .tab
            .lock()
            .map_err(|_| DriverError::Protocol("tab lock poisoned".into()))?
            .take();
        let Some(tab) = tab else {
            return Ok(());
        };
        blocking(CALL_TIMEOUT, move || {
            tab.close(false)
                .map(|_| ())
                .map_err(|e| DriverError::Protocol(format!("close tab: {e:#}")))
        })
        .await
    }

    async fn close_context(&self) -> Result<(), DriverError> {
        let browser = self
            .browser
            .lock()
            .map_err(|_| DriverError::Protocol("browser lock poisoned".into()))?
            .take();
        if let Some(browser) = browser {
            // dropping the last handle kills the process
            blocking(CALL_TIMEOUT, move || {
                drop(browser);
                Ok(())
            })
            .await?;
        }
        Ok(())
    }
}

/// Run a synchronous CDP call on the blocking pool with a hard timeout
async fn blocking<T, F>(timeout: Duration, call: F) -> Result<T, DriverError>
where
    F: FnOnce() -> Result<T, DriverError> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(call);
    match tokio::time::timeout(timeout + HARD_TIMEOUT_MARGIN, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(DriverError::Protocol(format!("browser task failed: {join}"))),
        Err(_) => Err(DriverError::Protocol(format!(
            "browser call stuck for more than {:?}",
            timeout + HARD_TIMEOUT_MARGIN
        ))),
    }
}

fn missing(selector: &str, err: &anyhow::Error) -> DriverError {
    DriverError::ElementMissing {
        selector: selector.to_string(),
        message: format!("{err:#}"),
    }
}

/// Turn a saved cookie snapshot into `setCookies` parameters.
///
/// Only fields accepted by `CookieParam` are kept; session cookies (no
/// positive expiry) are replayed without one.
fn cookie_params_from_snapshot(raw: &[u8]) -> Result<Vec<CookieParam>, DriverError> {
    let cookies: Vec<Map<String, Value>> = serde_json::from_slice(raw)
        .map_err(|e| DriverError::Credentials(format!("decode cookie snapshot: {e}")))?;

    cookies
        .into_iter()
        .map(|cookie| {
            let mut param: Map<String, Value> = cookie
                .into_iter()
                .filter(|(key, _)| COOKIE_PARAM_FIELDS.contains(&key.as_str()))
                .collect();
            if param.get("expires").and_then(Value::as_f64).is_none_or(|exp| exp <= 0.0) {
                param.remove("expires");
            }
            serde_json::from_value(Value::Object(param))
                .map_err(|e| DriverError::Credentials(format!("invalid cookie: {e}")))
        })
        .collect()
}

fn dispatch_event(observer: &dyn PageObserver, event: &Event) {
    match event {
        Event::NetworkRequestWillBeSent(ev) => {
            observer.on_request(&ev.params.request.method, &ev.params.request.url);
        }
        Event::NetworkResponseReceived(ev) => {
            observer.on_response(ev.params.response.status, &ev.params.response.url);
        }
        Event::RuntimeExceptionThrown(ev) => {
            observer.on_page_error(&ev.params.exception_details.text);
        }
        Event::InspectorTargetCrashed(_) => observer.on_crash(),
        _ => {}
    }
}
