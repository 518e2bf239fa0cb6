//! Version check against the published manifest

use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use tracing::{error, info, warn};

use crate::domain::services::{Notifier, Severity, UpdateSource};
use crate::infrastructure::http_client::HttpClient;

#[derive(Debug, Deserialize)]
struct Manifest {
    version: String,
}

/// Manifest endpoint bound to a client
#[derive(Clone)]
pub struct UpdateChecker {
    http: HttpClient,
    manifest_url: String,
}

impl UpdateChecker {
    pub fn new(http: HttpClient, manifest_url: impl Into<String>) -> Self {
        Self {
            http,
            manifest_url: manifest_url.into(),
        }
    }
}

#[async_trait]
impl UpdateSource for UpdateChecker {
    async fn check(&self, notifier: &dyn Notifier) -> Option<String> {
        check_for_updates(&self.http, &self.manifest_url, notifier).await
    }
}

/// Compare the manifest version with this build and announce newer releases.
///
/// Returns the newer version if there is one. Network and decode failures are
/// logged and swallowed.
pub async fn check_for_updates(
    http: &HttpClient,
    manifest_url: &str,
    notifier: &dyn Notifier,
) -> Option<String> {
    let manifest: Manifest = match http.get_json(manifest_url).await {
        Ok(manifest) => manifest,
        Err(e) => {
            error!(error = %e, "Failed to check for updates");
            return None;
        }
    };

    let current = env!("CARGO_PKG_VERSION");
    if compare_versions(&manifest.version, current) == Ordering::Greater {
        warn!(latest = %manifest.version, current, "New version available, please update manually");
        notifier.notify(
            &format!("New version {} available (running {current})", manifest.version),
            Severity::Warn,
        );
        Some(manifest.version)
    } else {
        info!(current, "Running the latest version");
        None
    }
}

/// Dotted numeric comparison; missing or non-numeric parts count as zero
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .trim_start_matches('v')
            .split('.')
            .map(|part| {
                part.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0)))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}
