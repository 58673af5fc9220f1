// src/farming/format.rs
//! Display helpers for the positions table

use crate::farming::types::Position;

const REWARD_DISPLAY_CHARS: usize = 8;

/// Remaining time until `end_time_secs` as `[{days}d ]HH:MM:SS`.
///
/// Past end times are not handled here; see `format_end_time`.
pub fn format_countdown(end_time_secs: i64, now_ms: i64) -> String {
    let remaining = end_time_secs.saturating_mul(1000).saturating_sub(now_ms) as f64 / 1000.0;
    let days = (remaining / 86_400.0).floor() as i64;
    let hours = (remaining / 3_600.0).floor() as i64 % 24;
    let minutes = (remaining / 60.0).floor() as i64 % 60;
    let seconds = remaining.floor() as i64 % 60;

    let day_prefix = if days > 0 { format!("{}d ", days) } else { String::new() };
    format!("{}{:02}:{:02}:{:02}", day_prefix, hours, minutes, seconds)
}

/// Shortest round-trip text, switching to exponent form below 1e-6 and from
/// 1e21 up, the way web front-ends print numbers ("1e-7", "1.5e+21").
fn number_text(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 || (1e-6..1e21).contains(&magnitude) {
        // `-0.0` prints as "0"
        return (value + 0.0).to_string();
    }

    let scientific = format!("{:e}", value);
    match scientific.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{}e+{}", mantissa, exponent),
        _ => scientific,
    }
}

/// Lossy, display-only truncation of an earned amount
pub fn format_reward(value: f64) -> String {
    let text = number_text(value);
    if text.chars().count() > REWARD_DISPLAY_CHARS {
        let kept: String = text.chars().take(REWARD_DISPLAY_CHARS).collect();
        format!("{}..", kept)
    } else {
        text
    }
}

/// End-time cell: "Finished" once the incentive is over, else a countdown
pub fn format_end_time(position: &Position, now_ms: i64) -> String {
    if position.has_ended || position.incentive_end_time.saturating_mul(1000) < now_ms {
        "Finished".to_string()
    } else {
        format_countdown(position.incentive_end_time, now_ms)
    }
}
