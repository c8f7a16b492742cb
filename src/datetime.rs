//! Free-text date and time extraction. Everything returns naive local
//! timestamps; the site's timezone travels separately.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::error::ItemError;

/// `10:00 am`, `10:00a.m.`, `7:00 PM`, `7:00P.M.`
static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*([ap])\.?\s*m\.?").unwrap());
/// `10 am`, `3p.m.`
static HOUR_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*([ap])\.?\s*m\b\.?").unwrap());
/// Leading `time │` prefix that BoardDocs glues onto descriptions.
static TIME_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}\s*[apAP]\.?[mM]\.?\s*│\s*").unwrap());
static NAMED_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z]+\.?\s+\d{1,2},?\s+\d{4}\b").unwrap());
static NUMERIC_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/(?:\d{4}|\d{2})\b").unwrap());
static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+").unwrap()
});

const DATE_FORMATS: &[&str] = &[
    "%B %d, %Y",
    "%B %d %Y",
    "%b. %d, %Y",
    // two-digit years first: `%Y` would read `24` as year 24
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y-%m-%d",
];

/// First clock time embedded anywhere in `text`.
pub fn find_time(text: &str) -> Option<NaiveTime> {
    let caps = CLOCK_RE.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    to_24h(hour, minute, &caps[3])
}

/// Clock time that may omit minutes (`10 AM`).
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    if let Some(t) = find_time(text) {
        return Some(t);
    }
    let caps = HOUR_ONLY_RE.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    to_24h(hour, 0, &caps[2])
}

fn to_24h(hour: u32, minute: u32, meridiem: &str) -> Option<NaiveTime> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = meridiem.eq_ignore_ascii_case("p");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Combine `date` with the first time found in `text`. No time means a
/// day-only meeting at midnight, never a failure.
pub fn combine_with_text(text: &str, date: NaiveDate) -> NaiveDateTime {
    match find_time(text) {
        Some(time) => date.and_time(time),
        None => date.and_time(NaiveTime::MIN),
    }
}

/// Drop a leading `10:00 AM │ ` from a description.
pub fn strip_time_prefix(text: &str) -> String {
    TIME_PREFIX_RE.replace(text, "").into_owned()
}

/// Split `"<time> - <time>"`. No dash means no end.
pub fn split_range(text: &str) -> (&str, Option<&str>) {
    let text = text.trim();
    for sep in [" - ", " – ", " — "] {
        if let Some((start, end)) = text.split_once(sep) {
            return (start.trim(), Some(end.trim()));
        }
    }
    (text, None)
}

/// Start and optional end time from a `"10:00 AM - 11:30 AM"` style string.
pub fn parse_time_range(text: &str) -> Result<(NaiveTime, Option<NaiveTime>), ItemError> {
    let (start, end) = split_range(text);
    let start = parse_clock(start).ok_or_else(|| ItemError::DateParse(text.to_string()))?;
    let end = match end {
        Some(e) => Some(parse_clock(e).ok_or_else(|| ItemError::DateParse(text.to_string()))?),
        None => None,
    };
    Ok((start, end))
}

/// Parse a whole string as a calendar date (`June 13, 2024`, `Thursday, June 13, 2024`,
/// `11/1/2024`, `1/5/24`, `2024-06-13`).
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = WEEKDAY_RE.replace(&cleaned, "");
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

/// Locate and parse the first date inside noisy text.
pub fn find_date(text: &str) -> Option<NaiveDate> {
    NAMED_DATE_RE
        .find_iter(text)
        .chain(NUMERIC_DATE_RE.find_iter(text))
        .find_map(|m| parse_date(m.as_str()))
}

/// A date only if the text *starts* with something date-shaped.
pub fn leading_date(text: &str) -> Option<Result<NaiveDate, ItemError>> {
    let m = [&*NAMED_DATE_RE, &*NUMERIC_DATE_RE]
        .iter()
        .filter_map(|re| re.find(text))
        .find(|m| m.start() == 0)?;
    Some(parse_date(m.as_str()).ok_or_else(|| ItemError::DateParse(text.to_string())))
}

/// iCalendar `DATE-TIME` / `DATE` value. A trailing `Z` is dropped, keeping the
/// wall-clock fields as written.
pub fn parse_ical_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn combine_time_with_separator() {
        let got = combine_with_text("10:00 AM │ Some description", d(2024, 2, 19));
        assert_eq!(got, d(2024, 2, 19).and_time(t(10, 0)));
    }

    #[test]
    fn combine_without_time_is_midnight() {
        let got = combine_with_text("Some description without time", d(2024, 2, 19));
        assert_eq!(got, d(2024, 2, 19).and_time(t(0, 0)));
        assert_eq!(combine_with_text("", d(2024, 2, 19)), d(2024, 2, 19).and_time(t(0, 0)));
    }

    #[test]
    fn punctuation_variants() {
        assert_eq!(find_time("10:00a.m."), Some(t(10, 0)));
        assert_eq!(find_time("7:00 pm"), Some(t(19, 0)));
        assert_eq!(find_time("7:00 P.M."), Some(t(19, 0)));
        assert_eq!(find_time("12:15 am"), Some(t(0, 15)));
        assert_eq!(find_time("12:30 PM"), Some(t(12, 30)));
        assert_eq!(find_time("no time here"), None);
        assert_eq!(parse_clock("9 AM"), Some(t(9, 0)));
    }

    #[test]
    fn time_ranges() {
        assert_eq!(
            parse_time_range("10:00 AM - 11:30 AM").unwrap(),
            (t(10, 0), Some(t(11, 30)))
        );
        assert_eq!(parse_time_range("6:00 PM").unwrap(), (t(18, 0), None));
        assert!(parse_time_range("TBD").is_err());
    }

    #[test]
    fn strip_prefix() {
        assert_eq!(strip_time_prefix("6:30 PM │ Board Room"), "Board Room");
        assert_eq!(strip_time_prefix("Board Room 6:30 PM"), "Board Room 6:30 PM");
    }

    #[test]
    fn dates() {
        assert_eq!(parse_date("November 12, 2024"), Some(d(2024, 11, 12)));
        assert_eq!(parse_date("Thursday, June 13, 2024"), Some(d(2024, 6, 13)));
        assert_eq!(parse_date("11/1/2024"), Some(d(2024, 11, 1)));
        assert_eq!(parse_date("1/5/24"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("Invalid Date"), None);
        assert_eq!(find_date("Regular meeting on January 14, 2024 at noon"), Some(d(2024, 1, 14)));
        assert_eq!(find_date("01/14/2024"), Some(d(2024, 1, 14)));
    }

    #[test]
    fn leading_dates() {
        assert_eq!(leading_date("November 12, 2024").unwrap().unwrap(), d(2024, 11, 12));
        assert!(leading_date("Agenda Pack").is_none());
        assert!(leading_date("Smarch 40, 2024").unwrap().is_err());
    }

    #[test]
    fn ical_values() {
        assert_eq!(
            parse_ical_datetime("20240308T180000"),
            Some(d(2024, 3, 8).and_time(t(18, 0)))
        );
        assert_eq!(
            parse_ical_datetime("20240308T230000Z"),
            Some(d(2024, 3, 8).and_time(t(23, 0)))
        );
        assert_eq!(parse_ical_datetime("20240308"), Some(d(2024, 3, 8).and_time(t(0, 0))));
        assert_eq!(parse_ical_datetime("soon"), None);
    }
}
