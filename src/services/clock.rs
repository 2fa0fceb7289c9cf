use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Source of "now" in the business time zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// Minutes since midnight for an `HH:MM` string, or `None` if it is not one.
pub fn time_to_minutes(t: &str) -> Option<u32> {
    let (h, m) = t.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

pub fn minutes_to_time(mins: u32) -> String {
    format!("{:02}:{:02}", mins / 60, mins % 60)
}

/// Adds `mins` to an `HH:MM` string; malformed input is returned unchanged.
pub fn add_minutes(t: &str, mins: u32) -> String {
    match time_to_minutes(t) {
        Some(start) => minutes_to_time(start + mins),
        None => t.to_string(),
    }
}

pub fn is_business_day(date: &NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn minute_of_day(now: &DateTime<Tz>) -> u32 {
    now.hour() * 60 + now.minute()
}
