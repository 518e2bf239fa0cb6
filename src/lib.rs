//! Volume Guard - remaining data volume watcher
//!
//! Logs into a carrier's customer portal with a headless browser, reads the
//! remaining data volume, books a top-up when it runs low and reports every
//! measurement through Telegram and Discord.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
mod test_utils;

use anyhow::Context;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::application::{
    AppContext, BackgroundTasks, BrowserLifecycle, PollingOrchestrator, SessionLifecycle,
    ShutdownController,
};
use crate::domain::process_state::ProcessState;
use crate::domain::scheduler::AdaptiveScheduler;
use crate::domain::services::{Notifier, Severity, UpdateSource};
use crate::domain::tuning::{Thresholds, Timings};
use crate::infrastructure::logging::log_system_info;
use crate::infrastructure::{
    AppConfig, ChannelNotifier, ChromeLauncher, HttpClient, HttpClientConfig, LoggingObserver,
    SessionStore, SysinfoProbe, UpdateChecker, init_logging_with_config,
};

/// Load configuration, start the poller and block until a signal or a task
/// failure triggers the graceful shutdown.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;
    init_logging_with_config(&config.logging)?;
    log_system_info();
    info!(?config, "Configuration loaded");

    let http = HttpClient::new(&HttpClientConfig::default())?;
    let notifier: Arc<dyn Notifier> = Arc::new(ChannelNotifier::new(
        http.clone(),
        config.notifications.clone(),
    ));

    let store = SessionStore::new(&config.state_dir);
    store.ensure_dir().await?;

    let ctx = Arc::new(AppContext {
        state: Arc::new(ProcessState::new()),
        timings: Timings::default(),
        thresholds: Thresholds::default(),
        store,
        notifier,
        probe: Arc::new(SysinfoProbe::new()),
    });

    let observer = Arc::new(LoggingObserver::new(Arc::clone(&ctx.state)));
    let browser = Arc::new(BrowserLifecycle::new(
        Arc::clone(&ctx),
        Arc::new(ChromeLauncher::new(observer)),
        config.chrome_path.clone(),
    ));
    let sessions = Arc::new(SessionLifecycle::new(
        Arc::clone(&ctx),
        config.credentials.clone(),
    ));
    let update_source = config.auto_update.then(|| {
        Arc::new(UpdateChecker::new(http.clone(), config.update_manifest_url.clone()))
            as Arc<dyn UpdateSource>
    });
    let orchestrator = Arc::new(PollingOrchestrator::new(
        Arc::clone(&ctx),
        Arc::clone(&browser),
        Arc::clone(&sessions),
        AdaptiveScheduler::new(config.sleep_mode.clone()),
        update_source,
    ));
    let shutdown = ShutdownController::new(Arc::clone(&ctx), Arc::clone(&browser));

    ctx.notify("Volume guard started", Severity::Info);

    let mut tasks = JoinSet::new();
    BackgroundTasks::new(Arc::clone(&ctx), Arc::clone(&browser), sessions).spawn_all(&mut tasks);
    tasks.spawn(async move {
        orchestrator.run().await;
        "polling-loop"
    });

    let reason = tokio::select! {
        signal = wait_for_signal() => match signal {
            Ok(name) => {
                info!(signal = name, "Signal received");
                name.to_string()
            }
            Err(e) => {
                error!(error = %e, "Could not install signal handlers");
                "signal handler failure".to_string()
            }
        },
        finished = tasks.join_next() => match finished {
            Some(Ok(name)) => {
                warn!(task = name, "Task ended before shutdown");
                format!("{name} stopped")
            }
            Some(Err(e)) => {
                error!(error = %e, "Task failed");
                ctx.notify(&format!("Fatal error: {e}"), Severity::Error);
                "task failure".to_string()
            }
            None => "no tasks left".to_string(),
        },
    };

    shutdown.shutdown(&reason).await;
    tasks.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    Ok(tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    })
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
