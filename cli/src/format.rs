//! Human-readable output formatting.

use std::fmt::Display;

use chrono::{DateTime, Duration, TimeZone};

/// Format a number with a fixed number of decimals and `,` thousands separators.
pub fn format_number(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let digits = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (digits.as_str(), None),
    };

    let mut out = String::with_capacity(digits.len() + int_part.len() / 3 + 1);
    // "-0.00" reads as a sign error.
    if value < 0.0 && digits.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        out.push('-');
    }

    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }

    out
}

/// Monetary amount: two decimals.
pub fn format_amount(value: f64) -> String {
    format_number(value, 2)
}

/// Exchange rate: four decimals, or four significant digits below 1.
pub fn format_rate(value: f64) -> String {
    const SIGNIFICANT: usize = 4;
    const MAX_DECIMALS: usize = 12;

    let magnitude = value.abs();
    let decimals = if magnitude > 0.0 && magnitude < 1.0 {
        let leading_zeros = (-magnitude.log10().floor()) as usize - 1;
        (leading_zeros + SIGNIFICANT).min(MAX_DECIMALS)
    } else {
        SIGNIFICANT
    };
    format_number(value, decimals)
}

/// `MM/dd/yyyy, HH:mm:ss` in the given time zone.
pub fn format_time<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format("%m/%d/%Y, %H:%M:%S").to_string()
}

/// Compact `1h 5m 3s` rendering; negative durations render as `0s`.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) => format!("{}m {}s", minutes, seconds),
        _ => format!("{}h {}m {}s", hours, minutes, seconds),
    }
}
