//! Process memory sampling through `sysinfo`

use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::warn;

use crate::domain::services::MemoryProbe;
use crate::domain::session_meta::MemorySample;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Samples this process. There is no managed heap, so the heap fields mirror
/// resident and virtual size.
pub struct SysinfoProbe {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .inspect_err(|e| warn!(error = %e, "Cannot determine own pid, memory checks disabled"))
            .ok();
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn sample(&self) -> MemorySample {
        let Some(pid) = self.pid else {
            return MemorySample::default();
        };
        let Ok(mut sys) = self.system.lock() else {
            return MemorySample::default();
        };
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).map_or_else(MemorySample::default, |process| {
            let resident = process.memory() / BYTES_PER_MB;
            MemorySample {
                rss: resident,
                heap_used: resident,
                heap_total: process.virtual_memory() / BYTES_PER_MB,
                external: 0,
            }
        })
    }

    fn request_collection(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_own_process() {
        let probe = SysinfoProbe::new();
        let sample = probe.sample();
        assert_eq!(sample.rss, sample.heap_used);
        assert!(sample.heap_total >= sample.rss);
        assert_eq!(sample.external, 0);
        assert!(!probe.request_collection());
    }
}
