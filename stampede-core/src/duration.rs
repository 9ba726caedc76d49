//! Duration strings in the `<number><unit>` form used by step timeouts,
//! e.g. `20ms`, `1.5s`, `2h`. Units: `ns`, `us`, `ms`, `s`, `m`, `h`.

use std::time::Duration;

pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);

    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms)".to_string());
    }

    if s.starts_with('-') {
        return Err(format!("negative duration '{input}' is not allowed"));
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit() && *ch != '.')
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: f64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms)"))?;

    if !value.is_finite() {
        return Err(format!("invalid duration '{s}' (expected e.g. 10s, 250ms)"));
    }

    let unit_secs = match unit_str.trim() {
        "ns" => 1e-9,
        "us" | "µs" => 1e-6,
        "ms" => 1e-3,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        "" => return Err(format!("missing unit in duration '{s}' (expected e.g. 10s)")),
        unit => return Err(format!("unknown unit '{unit}' in duration '{s}'")),
    };

    Ok(Duration::from_secs_f64(value * unit_secs))
}
