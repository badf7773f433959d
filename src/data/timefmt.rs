/// Parsing of time cells: plain seconds or text durations.
///
/// Accepted duration forms:
///   - `hh:mm:ss[.fff]` and `mm:ss[.fff]`
///   - `N days hh:mm:ss[.fff]` / `N day hh:mm:ss`
///   - a number with a unit suffix: `ms`, `s`/`sec`, `m`/`min`, `h`/`hr`

use chrono::{NaiveTime, Timelike};

/// Parse a time cell to elapsed seconds. Numeric cells pass through unchanged.
pub fn parse_seconds(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<f64>() {
        return v.is_finite().then_some(v);
    }
    parse_duration(s)
}

/// Parse a text duration to elapsed seconds.
pub fn parse_duration(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let (days, rest) = split_days(s)?;
    let rest = rest.trim();

    let secs = if rest.contains(':') {
        clock_seconds(rest)?
    } else if rest.is_empty() {
        0.0
    } else {
        unit_seconds(rest)?
    };
    Some(days * 86_400.0 + secs)
}

/// Split a leading "N days" prefix off. Returns (days, remainder).
fn split_days(s: &str) -> Option<(f64, &str)> {
    let lower = s.to_ascii_lowercase();
    let Some(pos) = lower.find("day") else {
        return Some((0.0, s));
    };
    let days: f64 = s[..pos].trim().parse().ok()?;
    let mut rest = &s[pos + 3..];
    if rest.starts_with('s') || rest.starts_with('S') {
        rest = &rest[1..];
    }
    let rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    Some((days, rest))
}

fn clock_seconds(s: &str) -> Option<f64> {
    let negative = s.starts_with('-');
    let body = s.trim_start_matches('-');
    let parts = body.split(':').count();

    let secs = match parts {
        3 => {
            // Hours may exceed 23 in long recordings, so chrono only sees mm:ss.
            let (h, ms) = body.split_once(':')?;
            let hours: f64 = h.trim().parse().ok()?;
            hours * 3600.0 + minutes_seconds(ms)?
        }
        2 => minutes_seconds(body)?,
        _ => return None,
    };
    Some(if negative { -secs } else { secs })
}

fn minutes_seconds(s: &str) -> Option<f64> {
    let t = NaiveTime::parse_from_str(&format!("00:{}", s.trim()), "%H:%M:%S%.f").ok()?;
    Some(
        t.minute() as f64 * 60.0
            + t.second() as f64
            + t.nanosecond() as f64 / 1_000_000_000.0,
    )
}

fn unit_seconds(s: &str) -> Option<f64> {
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .filter(|&i| i > 0)?;
    let value: f64 = s[..split].trim().parse().ok()?;
    let factor = match s[split..].trim().to_ascii_lowercase().as_str() {
        "ms" => 0.001,
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        _ => return None,
    };
    Some(value * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn numeric_passes_through() {
        assert_eq!(parse_seconds("12.5"), Some(12.5));
        assert_eq!(parse_seconds(" 3 "), Some(3.0));
        assert_eq!(parse_seconds(""), None);
        assert_eq!(parse_seconds("nan"), None);
    }

    #[test]
    fn clock_forms() {
        assert_eq!(parse_seconds("00:01:30"), Some(90.0));
        assert_eq!(parse_seconds("01:00:00"), Some(3600.0));
        assert_eq!(parse_seconds("02:05"), Some(125.0));
        assert_relative_eq!(parse_seconds("00:00:01.250").unwrap(), 1.25);
        assert_eq!(parse_seconds("25:00:00"), Some(90_000.0));
    }

    #[test]
    fn day_prefix() {
        assert_eq!(parse_seconds("0 days 00:00:10"), Some(10.0));
        assert_eq!(parse_seconds("1 day 00:00:01"), Some(86_401.0));
    }

    #[test]
    fn unit_suffixes() {
        assert_eq!(parse_seconds("250ms"), Some(0.25));
        assert_eq!(parse_seconds("12s"), Some(12.0));
        assert_eq!(parse_seconds("3 min"), Some(180.0));
        assert_eq!(parse_seconds("1.5h"), Some(5400.0));
        assert_eq!(parse_seconds("abc"), None);
        assert_eq!(parse_seconds("5 parsecs"), None);
    }
}
