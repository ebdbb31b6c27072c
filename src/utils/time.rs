use std::time::Instant;

use chrono::Local;

pub fn now_instant() -> Instant {
    Instant::now()
}

pub fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Wall-clock timestamp used when narrating admitted requests.
pub fn wall_clock() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f %z").to_string()
}
