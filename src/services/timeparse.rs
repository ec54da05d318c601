//! Rule-based reading of dates, times, durations and titles from free text.
//!
//! This is the deterministic extractor: always available, no network. It is also
//! the per-field fallback applied after a language-model extractor has run.
//! All matching happens on lowercased text and relative to a caller-supplied `now`.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::{Captures, Regex};

use crate::models::ExtractedDetails;

/// Parsed durations are capped here (90 days) so later date arithmetic cannot
/// overflow; anything this long still fails booking validation on its length.
pub const DURATION_CEILING_MINUTES: i64 = 24 * 60 * 90;

const MERIDIEM: &str = r"(am\b|pm\b|a\.m\.|p\.m\.)";
const MONTHS: &str = r"(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)";

const TITLE_KEYWORDS: &[(&str, &str)] = &[
    ("meeting", "Meeting"),
    ("call", "Call"),
    ("appointment", "Appointment"),
    ("interview", "Interview"),
    ("consultation", "Consultation"),
];

// Compile-once regex patterns via OnceLock.
fn re_iso_datetime() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})[t ](\d{1,2}):(\d{2})\b").unwrap())
}

fn re_iso_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap())
}

fn re_range() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?:\b(between|from)\s+)?\b(\d{{1,2}})(?::(\d{{2}}))?\s*{MERIDIEM}?\s*(-|–|\bto\b|\band\b|\buntil\b|\btill\b)\s*(\d{{1,2}})(?::(\d{{2}}))?\s*{MERIDIEM}?"
        ))
        .unwrap()
    })
}

fn re_meridiem_time() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"\b(\d{{1,2}})(?::(\d{{2}}))?\s*{MERIDIEM}")).unwrap())
}

fn re_clock_time() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").unwrap())
}

fn re_at_hour() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bat\s+(\d{1,2})\b").unwrap())
}

fn re_weekday() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(next\s+|this\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thur|thu|fri|sat|sun)\b")
            .unwrap()
    })
}

fn re_month_day() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"\b{MONTHS}\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b")).unwrap()
    })
}

fn re_day_month() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTHS}\b")).unwrap()
    })
}

fn re_hours() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+(?:\.\d+)?)\s*(?:hours?|hrs?)\b").unwrap())
}

fn re_minutes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+)\s*(?:minutes?|mins?)\b").unwrap())
}

fn re_one_hour() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:an|one|a)\s+hour\b").unwrap())
}

/// Everything the rules can find in one utterance.
pub fn extract_hints(text: &str, now: NaiveDateTime) -> ExtractedDetails {
    let mut hints = ExtractedDetails::default();

    if let Some((start, end)) = parse_time_range(text, now) {
        hints.start = Some(start);
        hints.end = Some(end);
    } else {
        hints.start = parse_instant(text, now);
    }
    hints.duration_minutes = parse_duration(text);
    hints.title = title_from_keywords(text);

    hints
}

/// A single start instant: an ISO date-time, or a day expression and/or a time of day.
/// A day without a time means 09:00; a time without a day means today.
pub fn parse_instant(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = text.to_lowercase();

    if let Some(caps) = re_iso_datetime().captures(&text) {
        let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
        let time = NaiveTime::from_hms_opt(caps[2].parse().ok()?, caps[3].parse().ok()?, 0)?;
        return Some(date.and_time(time));
    }

    let today = now.date();
    match (parse_day(&text, today), parse_clock_time(&text)) {
        (Some(day), Some(time)) => Some(day.and_time(time)),
        (Some(day), None) => Some(day.and_time(NaiveTime::from_hms_opt(9, 0, 0)?)),
        (None, Some(time)) => Some(today.and_time(time)),
        (None, None) => None,
    }
}

/// An explicit range such as `3-5pm`, `10:30-11:15` or `between 2 and 4 pm`,
/// placed on the day the text names (today otherwise).
pub fn parse_time_range(text: &str, now: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let text = text.to_lowercase();
    // ISO dates would otherwise read as "10-21".
    let cleaned = re_iso_date().replace_all(&text, " ");

    let (start, end) = re_range().captures_iter(&cleaned).find_map(|caps| range_from(&caps))?;

    let day = parse_day(&text, now.date()).unwrap_or(now.date());
    Some((day.and_time(start), day.and_time(end)))
}

fn range_from(caps: &Captures) -> Option<(NaiveTime, NaiveTime)> {
    let lead = caps.get(1).map(|m| m.as_str());
    let connector = caps.get(5).map(|m| m.as_str())?;
    if connector == "and" && lead != Some("between") {
        return None;
    }

    let first_meridiem = caps.get(4).map(|m| m.as_str());
    let second_meridiem = caps.get(8).map(|m| m.as_str());
    let both_have_minutes = caps.get(3).is_some() && caps.get(7).is_some();
    if lead.is_none() && first_meridiem.is_none() && second_meridiem.is_none() && !both_have_minutes {
        return None;
    }

    let start_hour: u32 = caps[2].parse().ok()?;
    let start_minute: Option<u32> = caps.get(3).and_then(|m| m.as_str().parse().ok());
    let end_hour: u32 = caps[6].parse().ok()?;
    let end_minute: Option<u32> = caps.get(7).and_then(|m| m.as_str().parse().ok());

    // A single marker applies to both ends.
    let end = to_time(end_hour, end_minute, second_meridiem.or(first_meridiem))?;
    let mut start = to_time(start_hour, start_minute, first_meridiem.or(second_meridiem))?;

    // "11-1pm": the inherited marker only fits the end.
    if start >= end && first_meridiem.is_none() && second_meridiem.is_some() {
        start = to_time(start_hour, start_minute, Some("am"))?;
    }

    (start < end).then_some((start, end))
}

/// Convert a clock reading to a time. Bare hours before 8 without a marker are
/// read as afternoon.
fn to_time(hour: u32, minute: Option<u32>, meridiem: Option<&str>) -> Option<NaiveTime> {
    let hour = match meridiem {
        Some(m) if m.starts_with('p') => match hour {
            1..=11 => hour + 12,
            12 => 12,
            _ => return None,
        },
        Some(_) => match hour {
            1..=11 => hour,
            12 => 0,
            _ => return None,
        },
        None if minute.is_none() && (1..8).contains(&hour) => hour + 12,
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute.unwrap_or(0), 0)
}

fn parse_clock_time(text: &str) -> Option<NaiveTime> {
    if let Some(caps) = re_meridiem_time().captures(text) {
        let hour = caps[1].parse().ok()?;
        let minute = caps.get(2).and_then(|m| m.as_str().parse().ok());
        return to_time(hour, minute, Some(&caps[3]));
    }
    if let Some(caps) = re_clock_time().captures(text) {
        return NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0);
    }
    if let Some(caps) = re_at_hour().captures(text) {
        return to_time(caps[1].parse().ok()?, None, None);
    }

    let hour = if contains_word(text, "noon") || contains_word(text, "midday") {
        12
    } else if contains_word(text, "midnight") {
        0
    } else if contains_word(text, "morning") {
        9
    } else if contains_word(text, "afternoon") {
        14
    } else if contains_word(text, "evening") {
        17
    } else if contains_word(text, "tonight") {
        19
    } else {
        return None;
    };
    NaiveTime::from_hms_opt(hour, 0, 0)
}

fn parse_day(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = re_iso_date().captures(text) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }
    if text.contains("day after tomorrow") {
        return Some(today + Duration::days(2));
    }
    if contains_word(text, "tomorrow") {
        return Some(today + Duration::days(1));
    }
    if contains_word(text, "today") || contains_word(text, "tonight") {
        return Some(today);
    }
    if let Some(date) = parse_month_day(text, today) {
        return Some(date);
    }

    let days_to_next_monday = 7 - i64::from(today.weekday().num_days_from_monday());
    if let Some(caps) = re_weekday().captures(text) {
        let target = weekday_from(&caps[2])?;
        let qualifier = caps.get(1).map(|m| m.as_str().trim());
        let today_idx = i64::from(today.weekday().num_days_from_monday());
        let target_idx = i64::from(target.num_days_from_monday());

        let ahead = match qualifier {
            Some("next") => days_to_next_monday + target_idx,
            Some(_) => (target_idx - today_idx).rem_euclid(7),
            None => match (target_idx - today_idx).rem_euclid(7) {
                0 => 7,
                n => n,
            },
        };
        return Some(today + Duration::days(ahead));
    }
    if text.contains("next week") {
        return Some(today + Duration::days(days_to_next_monday));
    }

    None
}

fn parse_month_day(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let (month, day) = if let Some(caps) = re_month_day().captures(text) {
        (month_from(&caps[1])?, caps[2].parse().ok()?)
    } else if let Some(caps) = re_day_month().captures(text) {
        (month_from(&caps[2])?, caps[1].parse().ok()?)
    } else {
        return None;
    };

    let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if date < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(date)
    }
}

fn weekday_from(name: &str) -> Option<Weekday> {
    match name.get(..3)? {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn month_from(name: &str) -> Option<u32> {
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Total minutes named in phrases like `1 hour 30 minutes`, `1.5 hrs` or `half an hour`.
pub fn parse_duration(text: &str) -> Option<i64> {
    let text = text.to_lowercase();
    let mut total = 0.0_f64;

    for caps in re_hours().captures_iter(&text) {
        if let Ok(hours) = caps[1].parse::<f64>() {
            total += hours * 60.0;
        }
    }
    for caps in re_minutes().captures_iter(&text) {
        if let Ok(minutes) = caps[1].parse::<f64>() {
            total += minutes;
        }
    }

    if total <= 0.0 {
        total = if text.contains("hour and a half") || text.contains("hour and half") {
            90.0
        } else if text.contains("half an hour") || text.contains("half hour") {
            30.0
        } else if text.contains("quarter of an hour") || text.contains("quarter hour") {
            15.0
        } else if re_one_hour().is_match(&text) {
            60.0
        } else {
            0.0
        };
    }

    let minutes = (total.round() as i64).min(DURATION_CEILING_MINUTES);
    (minutes > 0).then_some(minutes)
}

/// Label for the appointment from the first keyword present, if any.
pub fn title_from_keywords(text: &str) -> Option<String> {
    let text = text.to_lowercase();
    let words: Vec<&str> = text.split(|c: char| !c.is_alphanumeric()).collect();
    TITLE_KEYWORDS
        .iter()
        .find(|(keyword, _)| words.iter().any(|w| w.starts_with(keyword)))
        .map(|(_, title)| title.to_string())
}

/// Lenient date-time reading for values produced by other systems: ISO-8601 with
/// or without seconds, space or `T` separated, or RFC 3339 with an offset.
pub fn parse_local_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

pub(crate) fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|w| w == word)
}

/// Human form used in replies, e.g. `Tuesday, October 20 at 3:00 PM`.
pub fn format_when(dt: &NaiveDateTime) -> String {
    dt.format("%A, %B %-d at %-I:%M %p").to_string()
}
