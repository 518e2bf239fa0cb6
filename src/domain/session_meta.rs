//! Persisted session metadata and the freshness decision
//!
//! The record is small JSON with camelCase keys so it stays readable next to the
//! cookie snapshot in the state directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::constants::browser::USER_AGENT;

/// Process memory in MB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySample {
    pub rss: u64,
    pub heap_used: u64,
    pub heap_total: u64,
    pub external: u64,
}

/// Last known state of the portal session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub last_activity: DateTime<Utc>,
    pub login_time: DateTime<Utc>,
    pub browser_restart_time: DateTime<Utc>,
    pub user_agent: String,
    #[serde(default)]
    pub memory_usage: MemorySample,
}

impl SessionMeta {
    /// Record written after a successful activity
    pub fn capture(
        last_activity: DateTime<Utc>,
        browser_restart_time: DateTime<Utc>,
        memory_usage: MemorySample,
    ) -> Self {
        Self {
            last_activity,
            login_time: Utc::now(),
            browser_restart_time,
            user_agent: USER_AGENT.to_string(),
            memory_usage,
        }
    }
}

/// Age limits that make a stored session unusable
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    pub session_timeout: Duration,
    pub browser_restart_interval: Duration,
}

impl FreshnessPolicy {
    /// True when there is no record, or either the activity age or the
    /// browser age exceeds its limit.
    pub fn is_expired(&self, meta: Option<&SessionMeta>, now: DateTime<Utc>) -> bool {
        let Some(meta) = meta else {
            return true;
        };
        exceeds(now, meta.last_activity, self.session_timeout)
            || exceeds(now, meta.browser_restart_time, self.browser_restart_interval)
    }
}

fn exceeds(now: DateTime<Utc>, since: DateTime<Utc>, limit: Duration) -> bool {
    let age = now.signed_duration_since(since);
    chrono::Duration::from_std(limit).is_ok_and(|limit| age > limit)
}
