//! Human-written durations: `"30s"`, `"15m"`, `"1h"`, `"1d"` or plain seconds.

use std::time::Duration;

const UNITS: &[(char, u64, &str)] = &[
    ('d', 86_400, "days"),
    ('h', 3_600, "hours"),
    ('m', 60, "minutes"),
    ('s', 1, "seconds"),
];

pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim().to_lowercase();

    for &(suffix, scale, name) in UNITS {
        if let Some(count) = s.strip_suffix(suffix) {
            let count = count
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("Invalid {}: {}", name, count))?;
            return count
                .checked_mul(scale)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("Duration too large: {}", s));
        }
    }

    s.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| format!("Invalid duration: {}. Use a form like '30s', '15m', '1h', '1d'", s))
}

/// Largest whole unit that divides the duration evenly.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    for &(suffix, scale, _) in UNITS {
        if secs >= scale && secs % scale == 0 {
            return format!("{}{}", secs / scale, suffix);
        }
    }
    format!("{}s", secs)
}
