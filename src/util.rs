use std::time::Duration;

/// Human-readable duration for log lines: `1h 2m 3s`, `4m 5s` or `6.789s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    match (total / 3600, (total % 3600) / 60, total % 60) {
        (0, 0, secs) => format!("{}.{:03}s", secs, elapsed.subsec_millis()),
        (0, mins, secs) => format!("{}m {}s", mins, secs),
        (hours, mins, secs) => format!("{}h {}m {}s", hours, mins, secs),
    }
}
