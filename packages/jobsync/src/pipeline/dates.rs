//! Date parsing for job postings.
//!
//! Every date normalizes to a calendar day in a reference offset (UTC+8 by
//! default). Relative forms resolve against the record's fetch time and are
//! floored to the day. Anything unparseable becomes `None`, never "now".

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};

/// UTC+8, the offset the postings are published in.
pub const DEFAULT_REFERENCE_OFFSET_SECS: i32 = 8 * 3600;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%Y.%m.%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const MONTH_DAY_FORMATS: &[(&str, &str)] = &[
    ("-", "%Y-%m-%d"),
    ("/", "%Y/%m/%d"),
    ("", "%Y年%m月%d日"),
];

/// Which field a date belongs to; only publish dates may roll back a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Publish,
    Deadline,
}

/// Parse a date string relative to `fetched_at`.
pub fn parse_date(
    input: &str,
    fetched_at: DateTime<Utc>,
    offset_secs: i32,
    kind: DateKind,
) -> Option<NaiveDate> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }

    let offset = reference_offset(offset_secs);
    let reference = fetched_at.with_timezone(&offset);

    if let Some(date) = parse_relative(text, reference) {
        return Some(date);
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&offset).date_naive());
    }

    parse_month_day(text, reference.date_naive(), kind)
}

/// Convert a Unix timestamp (seconds, or milliseconds when large) to a day.
pub fn date_from_timestamp(value: i64, offset_secs: i32) -> Option<NaiveDate> {
    // Anything past 10^11 seconds is year 5138; treat it as milliseconds.
    let millis = if value.abs() >= 100_000_000_000 {
        value
    } else {
        value.checked_mul(1000)?
    };
    let utc = Utc.timestamp_millis_opt(millis).single()?;
    Some(utc.with_timezone(&reference_offset(offset_secs)).date_naive())
}

fn reference_offset(offset_secs: i32) -> FixedOffset {
    match FixedOffset::east_opt(offset_secs) {
        Some(offset) => offset,
        None => Utc.fix(),
    }
}

fn parse_relative(text: &str, reference: DateTime<FixedOffset>) -> Option<NaiveDate> {
    let lowered = text.to_lowercase();
    let today = reference.date_naive();

    match lowered.as_str() {
        "今天" | "今日" | "today" | "刚刚" | "just now" => return Some(today),
        "昨天" | "昨日" | "yesterday" => return today.pred_opt(),
        "前天" => return today.pred_opt()?.pred_opt(),
        _ => {}
    }

    let (amount, unit) = split_amount(&lowered)?;
    let delta = match unit {
        "天前" | "日前" | "day ago" | "days ago" => Duration::try_days(amount)?,
        "周前" | "星期前" | "week ago" | "weeks ago" => Duration::try_weeks(amount)?,
        "小时前" | "hour ago" | "hours ago" => Duration::try_hours(amount)?,
        "分钟前" | "minute ago" | "minutes ago" | "min ago" | "mins ago" => {
            Duration::try_minutes(amount)?
        }
        _ => return None,
    };

    reference
        .checked_sub_signed(delta)
        .map(|instant| instant.date_naive())
}

/// Split "3天前" / "3 days ago" into (3, "天前") / (3, "days ago").
fn split_amount(text: &str) -> Option<(i64, &str)> {
    let digits_end = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)?;
    if digits_end == 0 {
        return None;
    }
    let amount = text[..digits_end].parse::<i64>().ok()?;
    Some((amount, text[digits_end..].trim()))
}

fn parse_month_day(text: &str, today: NaiveDate, kind: DateKind) -> Option<NaiveDate> {
    let year = today.year();

    let date = MONTH_DAY_FORMATS.iter().find_map(|(separator, format)| {
        let candidate = if separator.is_empty() {
            format!("{year}年{text}")
        } else {
            format!("{year}{separator}{text}")
        };
        NaiveDate::parse_from_str(&candidate, format).ok()
    })?;

    if kind == DateKind::Publish && date > today {
        return date.with_year(year - 1);
    }
    Some(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2025-06-15 10:00 at UTC+8
    fn fetched() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 2, 0, 0).unwrap()
    }

    fn parse(text: &str) -> Option<NaiveDate> {
        parse_date(text, fetched(), DEFAULT_REFERENCE_OFFSET_SECS, DateKind::Publish)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_absolute_formats() {
        assert_eq!(parse("2025-09-01"), Some(ymd(2025, 9, 1)));
        assert_eq!(parse("2025/9/1"), Some(ymd(2025, 9, 1)));
        assert_eq!(parse("2025年09月01日"), Some(ymd(2025, 9, 1)));
        assert_eq!(parse("2025-09-01 18:30:00"), Some(ymd(2025, 9, 1)));
        assert_eq!(parse("2025-09-01T18:30:00"), Some(ymd(2025, 9, 1)));
    }

    #[test]
    fn test_rfc3339_lands_in_reference_offset() {
        // 20:00 UTC on the 1st is 04:00 on the 2nd at UTC+8
        assert_eq!(parse("2025-09-01T20:00:00Z"), Some(ymd(2025, 9, 2)));
    }

    #[test]
    fn test_relative_forms() {
        assert_eq!(parse("今天"), Some(ymd(2025, 6, 15)));
        assert_eq!(parse("刚刚"), Some(ymd(2025, 6, 15)));
        assert_eq!(parse("昨天"), Some(ymd(2025, 6, 14)));
        assert_eq!(parse("前天"), Some(ymd(2025, 6, 13)));
        assert_eq!(parse("3天前"), Some(ymd(2025, 6, 12)));
        assert_eq!(parse("3 days ago"), Some(ymd(2025, 6, 12)));
        assert_eq!(parse("2周前"), Some(ymd(2025, 6, 1)));
        assert_eq!(parse("Yesterday"), Some(ymd(2025, 6, 14)));
    }

    #[test]
    fn test_hours_ago_floors_to_day_in_offset() {
        // 10:00 local minus 11 hours crosses midnight
        assert_eq!(parse("11小时前"), Some(ymd(2025, 6, 14)));
        assert_eq!(parse("5 hours ago"), Some(ymd(2025, 6, 15)));
        assert_eq!(parse("30分钟前"), Some(ymd(2025, 6, 15)));
    }

    #[test]
    fn test_month_day_uses_fetch_year() {
        assert_eq!(parse("06-01"), Some(ymd(2025, 6, 1)));
        assert_eq!(parse("6月1日"), Some(ymd(2025, 6, 1)));
    }

    #[test]
    fn test_future_month_day_publish_date_rolls_back() {
        assert_eq!(parse("12/20"), Some(ymd(2024, 12, 20)));
        assert_eq!(
            parse_date("12/20", fetched(), DEFAULT_REFERENCE_OFFSET_SECS, DateKind::Deadline),
            Some(ymd(2025, 12, 20))
        );
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   "), None);
        assert_eq!(parse("尽快"), None);
        assert_eq!(parse("2025-13-45"), None);
        assert_eq!(parse("days ago"), None);
    }

    #[test]
    fn test_timestamps_seconds_and_millis() {
        // 2025-09-01T00:00:00+08:00
        assert_eq!(
            date_from_timestamp(1_756_656_000, DEFAULT_REFERENCE_OFFSET_SECS),
            Some(ymd(2025, 9, 1))
        );
        assert_eq!(
            date_from_timestamp(1_756_656_000_000, DEFAULT_REFERENCE_OFFSET_SECS),
            Some(ymd(2025, 9, 1))
        );
    }
}
