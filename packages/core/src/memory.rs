//! Host memory probe.
//!
//! `probe()` is a total function: whatever the OS does, the caller gets a
//! `MemoryStatus` back. The admission policy keys off `available_gb`
//! alone; the remaining fields exist for the status surface.

use sysinfo::System;
use tracing::warn;

const KB_PER_GB: f64 = 1_048_576.0;
const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Apple Silicon page size; vm_stat reports in pages.
#[allow(dead_code)]
const DARWIN_PAGE_SIZE: u64 = 16_384;

/// Snapshot of host memory, all values in GB rounded to 0.01.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MemoryStatus {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub app_gb: f64,
    pub wired_gb: f64,
    pub compressed_gb: f64,
}

impl MemoryStatus {
    pub fn usage_percent(&self) -> f64 {
        if self.total_gb > 0.0 {
            (self.used_gb / self.total_gb) * 100.0
        } else {
            0.0
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Probe current host memory. Never fails: on any OS or parse error the
/// conservative fallback (50% of total assumed available) is returned.
pub fn probe() -> MemoryStatus {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string("/proc/meminfo") {
            Ok(raw) => {
                if let Some(status) = parse_meminfo(&raw) {
                    return status;
                }
                warn!("unparseable /proc/meminfo, using fallback estimate");
            }
            Err(error) => {
                warn!(%error, "failed to read /proc/meminfo, using fallback estimate");
            }
        }
        fallback()
    }

    #[cfg(target_os = "macos")]
    {
        match probe_darwin() {
            Some(status) => status,
            None => {
                warn!("vm_stat/sysctl probe failed, using fallback estimate");
                fallback()
            }
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        fallback()
    }
}

/// Parse the kernel memory report. Pure so the field derivations are
/// testable without a Linux host.
///
/// `available = MemAvailable` (or half of total when the kernel is too
/// old to report it); `app = used - buffers - cached`.
pub(crate) fn parse_meminfo(raw: &str) -> Option<MemoryStatus> {
    let mut fields = std::collections::HashMap::new();
    for line in raw.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        if let Some(kb) = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok()) {
            fields.insert(key.trim(), kb as f64 / KB_PER_GB);
        }
    }

    let total = *fields.get("MemTotal")?;
    let available = fields.get("MemAvailable").copied().unwrap_or(total * 0.5);
    let used = total - available;
    let buffers = fields.get("Buffers").copied().unwrap_or(0.0);
    let cached = fields.get("Cached").copied().unwrap_or(0.0);

    Some(MemoryStatus {
        total_gb: round2(total),
        used_gb: round2(used),
        available_gb: round2(available),
        app_gb: round2(used - buffers - cached),
        wired_gb: 0.0,
        compressed_gb: 0.0,
    })
}

#[cfg(target_os = "macos")]
fn probe_darwin() -> Option<MemoryStatus> {
    use std::process::Command;

    let total_bytes = Command::new("sysctl")
        .args(["-n", "hw.memsize"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8_lossy(&out.stdout).trim().parse::<u64>().ok())?;

    let vm_stat = Command::new("vm_stat").output().ok().filter(|out| out.status.success())?;
    parse_vm_stat(&String::from_utf8_lossy(&vm_stat.stdout), total_bytes)
}

/// Derive a `MemoryStatus` from vm_stat page counters.
///
/// Reclaimable memory on Darwin is free + purgeable + speculative +
/// inactive pages; wired and compressor pages are reported as-is.
#[allow(dead_code)]
pub(crate) fn parse_vm_stat(raw: &str, total_bytes: u64) -> Option<MemoryStatus> {
    let mut pages = std::collections::HashMap::new();
    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
        if let Ok(count) = digits.parse::<u64>() {
            pages.insert(key.trim().to_string(), count);
        }
    }

    let page = |name: &str| pages.get(name).copied().unwrap_or(0);
    // A report without a free-page count is not vm_stat output.
    if !pages.contains_key("Pages free") {
        return None;
    }

    let to_gb = |count: u64| (count * DARWIN_PAGE_SIZE) as f64 / BYTES_PER_GB;

    let total = total_bytes as f64 / BYTES_PER_GB;
    let available = to_gb(
        page("Pages free")
            + page("Pages purgeable")
            + page("Pages speculative")
            + page("Pages inactive"),
    );
    let used = total - available;

    Some(MemoryStatus {
        total_gb: round2(total),
        used_gb: round2(used),
        available_gb: round2(available),
        app_gb: round2(to_gb(page("Pages active") + page("Pages inactive"))),
        wired_gb: round2(to_gb(page("Pages wired down"))),
        compressed_gb: round2(to_gb(page("Pages occupied by compressor"))),
    })
}

/// Conservative estimate when the OS cannot be asked: half of total
/// memory assumed available, 32 GB total if even that is unknown.
fn fallback() -> MemoryStatus {
    let mut system = System::new_all();
    system.refresh_memory();

    let total_bytes = system.total_memory();
    let total = if total_bytes > 0 {
        total_bytes as f64 / BYTES_PER_GB
    } else {
        32.0
    };

    MemoryStatus {
        total_gb: round2(total),
        used_gb: round2(total * 0.5),
        available_gb: round2(total * 0.5),
        app_gb: round2(total * 0.3),
        wired_gb: round2(total * 0.15),
        compressed_gb: round2(total * 0.05),
    }
}
