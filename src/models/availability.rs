use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// Opening hours applied to every business day.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessHours {
    pub days: Vec<Weekday>,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
        }
    }
}

impl BusinessHours {
    /// Build from config strings such as `"mon,tue,wed"`, `"09:00"`, `"18:00"`.
    pub fn parse(days: &str, open: &str, close: &str) -> anyhow::Result<Self> {
        let mut parsed_days = Vec::new();
        for day in days.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let weekday = parse_weekday(day)?;
            if !parsed_days.contains(&weekday) {
                parsed_days.push(weekday);
            }
        }
        if parsed_days.is_empty() {
            anyhow::bail!("at least one business day is required");
        }
        parsed_days.sort_by_key(|d| d.num_days_from_monday());

        let open = parse_time(open)?;
        let close = parse_time(close)?;
        if open >= close {
            anyhow::bail!("business hours must open before they close: {open}-{close}");
        }

        Ok(Self {
            days: parsed_days,
            open,
            close,
        })
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        self.days.contains(&date.weekday())
    }

    pub fn opens_at(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.open)
    }

    pub fn closes_at(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.close)
    }

    /// True when `[start, end)` sits inside one business day's opening hours.
    pub fn contains(&self, start: &NaiveDateTime, end: &NaiveDateTime) -> bool {
        let day = start.date();
        self.is_business_day(day)
            && *start >= self.opens_at(day)
            && *end <= self.closes_at(day)
            && start < end
    }

    pub fn to_human_readable(&self) -> String {
        let mut runs: Vec<(Weekday, Weekday)> = Vec::new();
        for day in &self.days {
            match runs.last_mut() {
                Some((_, last)) if last.succ() == *day && *day != Weekday::Mon => *last = *day,
                _ => runs.push((*day, *day)),
            }
        }

        let days = runs
            .iter()
            .map(|(first, last)| {
                if first == last {
                    short_name(*first).to_string()
                } else {
                    format!("{}-{}", short_name(*first), short_name(*last))
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{days}, {}-{}",
            self.open.format("%H:%M"),
            self.close.format("%H:%M")
        )
    }
}

fn short_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

fn parse_weekday(s: &str) -> anyhow::Result<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => Err(anyhow::anyhow!("invalid weekday: {s}")),
    }
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow::anyhow!("time out of range: {s}"))
}
