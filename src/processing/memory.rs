//! Process memory probing

use std::fmt::Debug;

/// Source of resident memory readings in megabytes
pub trait MemoryProbe: Debug {
    fn usage_mb(&self) -> f64;
}

/// Reads the resident set size of the current process.
///
/// Returns 0.0 when the platform offers no way to read it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemoryProbe;

impl MemoryProbe for ProcessMemoryProbe {
    fn usage_mb(&self) -> f64 {
        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
                if let Some(kb) = parse_vm_rss_kb(&status) {
                    return kb as f64 / 1024.0;
                }
            }
        }

        #[cfg(target_os = "macos")]
        {
            if let Ok(output) = std::process::Command::new("ps")
                .args(["-o", "rss=", "-p", &std::process::id().to_string()])
                .output()
            {
                if let Ok(rss_str) = String::from_utf8(output.stdout) {
                    if let Ok(rss_kb) = rss_str.trim().parse::<u64>() {
                        return rss_kb as f64 / 1024.0;
                    }
                }
            }
        }

        0.0
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}
