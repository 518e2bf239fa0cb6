//! Infrastructure module - adapters to the outside world
//!
//! Browser driver, notification channels, filesystem state, configuration and
//! logging. Everything here implements or feeds a trait from
//! [`crate::domain::services`].

pub mod chrome_driver;
pub mod config;
pub mod http_client;
pub mod logging;
pub mod memory_probe;
pub mod notifier;
pub mod page_events;
pub mod session_store;
pub mod update_check;
pub mod usage_parser;

pub use chrome_driver::ChromeLauncher;
pub use config::{AppConfig, LoggingConfig, NotificationConfig};
pub use http_client::{HttpClient, HttpClientConfig};
pub use logging::init_logging_with_config;
pub use memory_probe::SysinfoProbe;
pub use notifier::ChannelNotifier;
pub use page_events::LoggingObserver;
pub use session_store::SessionStore;
pub use update_check::{check_for_updates, UpdateChecker};
