use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, TimeZone};

use crate::error::ValidationError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar day of `instant`, evaluated in the instant's own time zone.
pub fn start_of_day<Tz: TimeZone>(instant: &DateTime<Tz>) -> NaiveDate {
    instant.date_naive()
}

/// The instant at which `day` begins in `tz`.
///
/// Zones that skip midnight for a DST transition resolve to the first valid
/// instant of the day instead.
pub fn local_midnight<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Option<DateTime<Tz>> {
    let midnight = day.and_hms_opt(0, 0, 0)?;
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => (1..=3).find_map(|hour| {
            let shifted = day.and_hms_opt(hour, 0, 0)?;
            tz.from_local_datetime(&shifted).earliest()
        }),
    }
}

pub fn is_same_day<Tz: TimeZone>(a: &DateTime<Tz>, b: &DateTime<Tz>) -> bool {
    let tz = a.timezone();
    start_of_day(a) == start_of_day(&b.with_timezone(&tz))
}

pub fn today() -> NaiveDate {
    start_of_day(&Local::now())
}

/// Strict `YYYY-MM-DD` check: exact digit layout and a real calendar date.
pub fn validate_date(input: &str) -> bool {
    parse_date(input).is_ok()
}

pub fn parse_date(input: &str) -> Result<NaiveDate, ValidationError> {
    let bytes = input.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(idx, byte)| match idx {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !shaped {
        return Err(ValidationError::MalformedDate(input.to_string()));
    }
    NaiveDate::parse_from_str(input, DATE_FORMAT)
        .map_err(|_| ValidationError::MalformedDate(input.to_string()))
}

/// Number of calendar days in `[start, end]`; zero when `end < start`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> u32 {
    let diff = end.signed_duration_since(start).num_days();
    if diff < 0 {
        0
    } else {
        u32::try_from(diff + 1).unwrap_or(u32::MAX)
    }
}

/// Iterates `[start, end]` one calendar day at a time.
pub fn day_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

pub fn previous_day(day: NaiveDate) -> Option<NaiveDate> {
    day.pred_opt()
}

pub fn add_days(day: NaiveDate, days: i64) -> Option<NaiveDate> {
    day.checked_add_signed(Duration::days(days))
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn format_day(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

/// "Today", "Yesterday", "3 days ago" and so on, relative to `today`.
pub fn relative_label(day: NaiveDate, today: NaiveDate) -> String {
    let diff = day.signed_duration_since(today).num_days();
    match diff {
        -1 => "Yesterday".to_string(),
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        d if d < 0 => format!("{} days ago", -d),
        d => format!("In {} days", d),
    }
}
