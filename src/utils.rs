use std::time::Duration;

use chrono::Utc;

pub fn now_epoch_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Compact wait time for chat replies: `23h 0m`, `4m 10s`, `9s`.
pub fn format_wait(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
