//! Bare scalar payloads: battery levels, switch commands, status words

use super::error::DecodeError;
use super::{BatteryLevel, SocketAction};

/// Trims whitespace and one pair of surrounding double quotes
pub(super) fn bare(payload: &str) -> &str {
    let trimmed = payload.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(trimmed)
}

pub(super) fn battery_level(payload: &str) -> BatteryLevel {
    let value = bare(payload);
    if let Ok(percent) = value.parse::<i64>() {
        return BatteryLevel::Percent(percent);
    }

    match value.to_ascii_lowercase().as_str() {
        "low" => BatteryLevel::Low,
        "full" | "high" => BatteryLevel::Full,
        "charging" => BatteryLevel::Charging,
        "discharging" => BatteryLevel::Discharging,
        _ => BatteryLevel::Unknown,
    }
}

pub(super) fn switch_action(payload: &str) -> Result<SocketAction, DecodeError> {
    let value = bare(payload);
    match value.to_ascii_lowercase().as_str() {
        "on" | "1" => Ok(SocketAction::On),
        "off" | "0" => Ok(SocketAction::Off),
        _ => Err(DecodeError::UnknownCommand(value.to_string())),
    }
}

pub(super) fn status_word(payload: &str) -> Result<String, DecodeError> {
    let value = bare(payload);
    if value.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(value.to_ascii_lowercase())
}
