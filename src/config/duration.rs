// src/config/duration.rs

use std::time::Duration;

/// Parse a duration string such as `"250ms"`, `"3s"`, `"2m"` or `"1h"`.
///
/// A bare number is interpreted as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);

    let value: u64 = num
        .parse()
        .map_err(|_| format!("invalid duration number in '{s}'"))?;

    let secs_per_unit = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        other => {
            return Err(format!(
                "invalid duration unit '{other}' in '{s}' (expected ms, s, m or h)"
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
