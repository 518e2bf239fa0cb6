//! Portal characteristics and timing constants
//!
//! Groups the fixed values the poller relies on: portal locations and
//! selectors, the spoofed browser identity, and the default timings and
//! thresholds of the resilience layer.

/// Customer portal locations and page structure
pub mod portal {
    /// Login entry point (the portal redirects unauthenticated visits here)
    pub const LOGIN_URL: &str =
        "https://kundenkonto.lidl-connect.de/mein-lidl-connect/mein-tarif/uebersicht.html";

    /// Tariff overview page holding the consumption blocks
    pub const OVERVIEW_URL: &str =
        "https://kundenkonto.lidl-connect.de/mein-lidl-connect/mein-tarif/uebersicht.html";

    /// URL fragments that indicate a redirect to the login page
    pub const LOGIN_URL_MARKERS: &[&str] = &["login", "anmelden"];

    /// Username (phone number) input
    pub const USERNAME_INPUT: &str = "#__BVID__27";

    /// Password input
    pub const PASSWORD_INPUT: &str = "#__BVID__31";

    /// Login submit button
    pub const SUBMIT_BUTTON: &str = "#submit-16";

    /// Primary usage block
    pub const USAGE_BLOCK: &str = ".consumption-info";

    /// Secondary refill usage block
    pub const REFILL_BLOCK: &str = ".refill-wrapper > .consumption-info";

    /// Unit label inside a usage block
    pub const UNIT_LABEL: &str = "span.unit";

    /// Button that books an additional gigabyte
    pub const TOP_UP_BUTTON: &str = ".tariff-btn-176";

    /// Confirmation shown after a booking
    pub const TOP_UP_CONFIRMATION: &str = ".alert";

    /// Volume added by a confirmed top-up, in GB
    pub const TOP_UP_VOLUME_GB: f64 = 1.0;
}

/// Browser identity and launch flags
pub mod browser {
    /// Spoofed identity string presented to the portal
    pub const USER_AGENT: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/139.0";

    /// Sandboxing and stability flags passed to every launch
    pub const LAUNCH_FLAGS: &[&str] = &[
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--no-first-run",
        "--disable-extensions",
        "--disable-background-timer-throttling",
        "--disable-backgrounding-occluded-windows",
        "--disable-renderer-backgrounding",
    ];
}

/// On-disk layout inside the state directory
pub mod files {
    /// Credential artifact (cookie snapshot)
    pub const CREDENTIALS_FILE: &str = "cookies.json";

    /// Session metadata record
    pub const SESSION_META_FILE: &str = "session_meta.json";

    /// Persistent browser profile
    pub const PROFILE_DIR: &str = "browser-profile";
}

/// Default timings in seconds
pub mod timing {
    /// Idle time after which a stored session is considered stale
    pub const SESSION_TIMEOUT_SECS: u64 = 25 * 60;

    /// Keep-alive ping period
    pub const KEEP_ALIVE_INTERVAL_SECS: u64 = 2 * 60;

    /// Scheduled browser restart period (also the session age limit)
    pub const BROWSER_RESTART_INTERVAL_SECS: u64 = 2 * 60 * 60;

    /// Memory watchdog period
    pub const MEMORY_CHECK_INTERVAL_SECS: u64 = 10 * 60;

    /// Whole validation chain
    pub const VALIDATION_TIMEOUT_SECS: u64 = 30;

    /// Whole login chain
    pub const LOGIN_TIMEOUT_SECS: u64 = 60;

    /// Page load during validation and keep-alive
    pub const PAGE_LOAD_TIMEOUT_SECS: u64 = 15;

    /// Page load for login and overview navigation
    pub const NAVIGATION_TIMEOUT_SECS: u64 = 20;

    /// Wait for a login form control
    pub const FORM_CONTROL_TIMEOUT_SECS: u64 = 15;

    /// Wait for the usage indicator after validation navigation
    pub const USAGE_INDICATOR_TIMEOUT_SECS: u64 = 10;

    /// Wait for the post-login navigation
    pub const LOGIN_NAVIGATION_TIMEOUT_SECS: u64 = 30;

    /// Whole keep-alive reload
    pub const KEEP_ALIVE_TIMEOUT_SECS: u64 = 20;

    /// Delay after repeated login failures
    pub const LOGIN_COOLDOWN_SECS: u64 = 60;

    /// Pause between closing and relaunching the browser
    pub const RESTART_SETTLE_SECS: u64 = 5;

    /// Pause after a navigation before inspecting the page
    pub const PAGE_SETTLE_SECS: u64 = 2;

    /// Pause between clearing and filling the login form
    pub const FORM_SETTLE_SECS: u64 = 1;

    /// Pause after the post-login navigation completed
    pub const POST_LOGIN_SETTLE_SECS: u64 = 3;

    /// Wait for the top-up button
    pub const TOP_UP_CLICK_TIMEOUT_SECS: u64 = 10;

    /// Wait after clicking top-up before looking for the confirmation
    pub const TOP_UP_CONFIRM_DELAY_SECS: u64 = 7;

    /// Interval used by the outer supervisor after too many errors
    pub const ERROR_PAUSE_SECS: u64 = 600;

    /// Grace period for final log lines and in-flight notifications
    pub const SHUTDOWN_SETTLE_SECS: u64 = 2;

    /// Upper bound for acquiring the browser during shutdown
    pub const SHUTDOWN_CLOSE_TIMEOUT_SECS: u64 = 90;
}

/// Default failure thresholds
pub mod thresholds {
    /// Login attempts allowed before a login counts as terminally failed
    pub const MAX_LOGIN_ATTEMPTS: u32 = 3;

    /// Failures before the circuit opens; also the outer supervisor's pause trigger
    pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

    /// Circuit breaker cooldown in seconds
    pub const CIRCUIT_COOLDOWN_SECS: u64 = 5 * 60;

    /// Cycle failures that trigger a browser restart
    pub const CYCLE_RESTART_ERRORS: u32 = 3;

    /// Keep-alive failures that trigger a browser restart
    pub const KEEP_ALIVE_RESTART_ERRORS: u32 = 3;

    /// Errors at which a relaunch wipes the browser profile first
    pub const PROFILE_WIPE_ERRORS: u32 = 2;

    /// Login attempt count from which failures impose the login cooldown
    pub const LOGIN_COOLDOWN_ATTEMPTS: u32 = 2;

    /// Soft resident memory limit in MB
    pub const MAX_MEMORY_MB: u64 = 500;

    /// Factor above the soft limit that forces a restart
    pub const CRITICAL_MEMORY_FACTOR: f64 = 1.5;
}
