//! Process memory reporting for the build log.

use log::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySnapshot {
    pub resident_mb: f64,
    /// High-water mark of resident memory, where the platform reports one.
    pub peak_mb: Option<f64>,
    pub percent_of_system: Option<f64>,
}

fn kb_field(content: &str, key: &str) -> Option<f64> {
    content
        .lines()
        .find(|line| line.starts_with(key))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<f64>().ok())
}

/// Reads a `/proc/<pid>/status` body, plus `/proc/meminfo` when available.
pub fn parse_proc_status(status: &str, meminfo: Option<&str>) -> Option<MemorySnapshot> {
    let rss_kb = kb_field(status, "VmRSS:")?;
    let peak_kb = kb_field(status, "VmHWM:");
    let percent_of_system = meminfo
        .and_then(|info| kb_field(info, "MemTotal:"))
        .filter(|total| *total > 0.0)
        .map(|total| rss_kb / total * 100.0);

    Some(MemorySnapshot {
        resident_mb: rss_kb / 1024.0,
        peak_mb: peak_kb.map(|kb| kb / 1024.0),
        percent_of_system,
    })
}

#[cfg(target_os = "linux")]
pub fn snapshot() -> Option<MemorySnapshot> {
    use std::fs::read_to_string;

    let status = read_to_string(format!("/proc/{}/status", std::process::id())).ok()?;
    let meminfo = read_to_string("/proc/meminfo").ok();
    parse_proc_status(&status, meminfo.as_deref())
}

#[cfg(target_os = "macos")]
pub fn snapshot() -> Option<MemorySnapshot> {
    use std::process::Command;

    let output = Command::new("ps")
        .args(["-o", "rss=", "-p", &std::process::id().to_string()])
        .output()
        .ok()?;
    let rss_kb = String::from_utf8_lossy(&output.stdout).trim().parse::<f64>().ok()?;

    let percent_of_system = Command::new("sysctl")
        .args(["-n", "hw.memsize"])
        .output()
        .ok()
        .and_then(|out| String::from_utf8_lossy(&out.stdout).trim().parse::<f64>().ok())
        .filter(|bytes| *bytes > 0.0)
        .map(|bytes| rss_kb / (bytes / 1024.0) * 100.0);

    Some(MemorySnapshot {
        resident_mb: rss_kb / 1024.0,
        peak_mb: None,
        percent_of_system,
    })
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn snapshot() -> Option<MemorySnapshot> {
    None
}

pub fn log_memory_usage(note: &str) {
    match snapshot() {
        Some(mem) => {
            let peak = mem
                .peak_mb
                .map_or_else(|| "N/A".to_string(), |mb| format!("{:.1} MB", mb));
            let percent = mem
                .percent_of_system
                .map_or_else(|| "N/A".to_string(), |p| format!("{:.1}%", p));
            info!(
                "Memory usage ({}): {:.1} MB resident, peak {}, {} of system memory",
                note, mem.resident_mb, peak, percent
            );
        }
        None => info!(
            "Memory usage tracking not available on this platform ({})",
            std::env::consts::OS
        ),
    }
}
