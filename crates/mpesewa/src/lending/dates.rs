use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Signed day difference rounded up, so any part of a day counts as a day.
pub fn ceil_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = (to - from).num_milliseconds();
    let whole = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        whole
    } else {
        whole + 1
    }
}

/// Whole days past `due`, never negative.
pub fn overdue_days(due: DateTime<Utc>, as_of: DateTime<Utc>) -> u32 {
    ceil_days_between(due, as_of).clamp(0, u32::MAX as i64) as u32
}

pub fn add_days(start: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    start + Duration::days(i64::from(days))
}

/// Move `months` forward and pin the day to the 28th, the platform's billing day.
pub fn expiry_on_28th(start: NaiveDate, months: u32) -> Option<NaiveDate> {
    start
        .with_day(1)?
        .checked_add_months(Months::new(months))?
        .with_day(28)
}

/// Calendar days from `today` until `date`; negative once `date` has passed.
pub fn days_until(today: NaiveDate, date: NaiveDate) -> i64 {
    (date - today).num_days()
}
