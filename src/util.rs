// Parsing and formatting helpers for the German export conventions
// (decimal comma, `DD.MM.YYYY` dates, `1.234,56 €`).
//
// Parsers return `Result<_, String>` so the loader can wrap the message in a
// `RowParseError` with the row and field attached.
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use num_format::{Locale, ToFormattedString};

pub const DATE_FORMAT: &str = "%d.%m.%Y";
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M";
pub const TIMESTAMP_SECONDS_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

const MONTHS_DE: [&str; 12] = [
    "Jan", "Feb", "Mär", "Apr", "Mai", "Jun", "Jul", "Aug", "Sep", "Okt", "Nov", "Dez",
];

/// Parse a decimal-comma amount such as `100,50` or `1.234,56`.
///
/// - Trims whitespace and rejects empty input.
/// - When a comma is present, dots are thousands separators.
/// - Rejects NaN, infinities and negative values.
pub fn parse_amount(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty amount".to_string());
    }
    let normalized = if s.contains(',') {
        s.replace('.', "").replace(',', ".")
    } else {
        s.to_string()
    };
    let value: f64 = normalized
        .parse()
        .map_err(|_| format!("not a number: {s:?}"))?;
    if !value.is_finite() {
        return Err(format!("not a finite number: {s:?}"));
    }
    if value < 0.0 {
        return Err(format!("negative amount: {s:?}"));
    }
    Ok(value)
}

/// Parse a head count; an empty cell counts as zero.
pub fn parse_count(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    s.parse::<u32>()
        .map_err(|_| format!("not a whole number: {s:?}"))
}

/// Parse `DD.MM.YYYY`, falling back to ISO `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty date".to_string());
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| format!("invalid date {s:?}, expected DD.MM.YYYY"))
}

/// Parse `DD.MM.YYYY HH:MM[:SS]`. The date and time are split on the first
/// space and composed without any timezone conversion; a missing time part
/// means midnight.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    let s = s.trim();
    let (date_part, time_part) = match s.split_once(' ') {
        Some((d, t)) => (d, t.trim()),
        None => (s, ""),
    };
    let date = parse_date(date_part)?;
    let time = if time_part.is_empty() {
        NaiveTime::MIN
    } else {
        NaiveTime::parse_from_str(time_part, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(time_part, "%H:%M"))
            .map_err(|_| format!("invalid time {time_part:?}, expected HH:MM"))?
    };
    Ok(date.and_time(time))
}

/// `WAHR` is the only literal that means true.
pub fn parse_flag(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("WAHR")
}

/// `(current - previous) / previous * 100`, or `None` when there is nothing
/// meaningful to divide by.
pub fn percent_change(current: f64, previous: Option<f64>) -> Option<f64> {
    let previous = previous?;
    if previous == 0.0 || !previous.is_finite() {
        return None;
    }
    let change = (current - previous) / previous * 100.0;
    change.is_finite().then_some(change)
}

/// Plain decimal-comma rendering without grouping, e.g. `100,5`. Used where
/// the text must be read back by [`parse_amount`].
pub fn decimal_comma(n: f64) -> String {
    n.to_string().replace('.', ",")
}

/// Fixed decimals with a decimal comma and no grouping: `1234,50`.
pub fn fixed_comma(n: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, n).replace('.', ",")
}

/// Fixed decimals, German grouping: `1.234.567,89`.
pub fn format_number(n: f64, decimals: usize) -> String {
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: u64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::de);
    if let Some(frac) = frac_part {
        res.push(',');
        res.push_str(frac);
    }
    if neg && res.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

/// `1.234,56 €`
pub fn format_currency(n: f64) -> String {
    format!("{} €", format_number(n, 2))
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::de)
}

/// A fraction rendered as percent with one decimal: `0.125` → `12,5 %`.
pub fn format_rate(fraction: f64) -> String {
    format!("{} %", format_number(fraction * 100.0, 1))
}

/// A signed percentage change: `+12,5%`, `-3,0%`, or empty when absent.
pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(c) if c > 0.0 => format!("+{}%", format_number(c, 1)),
        Some(c) => format!("{}%", format_number(c, 1)),
        None => String::new(),
    }
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// `DD.MM.YYYY HH:MM`, with `:SS` appended only when the seconds are set so
/// that [`parse_timestamp`] reads back the same value.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    if ts.second() == 0 && ts.nanosecond() == 0 {
        ts.format(TIMESTAMP_FORMAT).to_string()
    } else {
        ts.format(TIMESTAMP_SECONDS_FORMAT).to_string()
    }
}

/// `Mär 2024`
pub fn month_label(d: NaiveDate) -> String {
    format!("{} {}", MONTHS_DE[d.month0() as usize], d.year())
}

/// German name for a month-of-year key `01`..`12`.
pub fn month_name(month: u32) -> &'static str {
    MONTHS_DE[(month.clamp(1, 12) - 1) as usize]
}
