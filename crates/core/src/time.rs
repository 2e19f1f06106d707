//! Calendar arithmetic for lookback windows.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// The same day and time `months` calendar months earlier. The day is
/// clamped to the length of the target month.
pub fn subtract_months(dt: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let total = dt.year() * 12 + dt.month0() as i32 - months as i32;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;

    let mut day = dt.day();
    let date = loop {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            break date;
        }
        day -= 1;
    };

    date.and_time(dt.time()).and_utc()
}

/// Start of a lookback window of one `period` ending at `end`.
/// Accepts `hour`, `day`, `week` and `month`; anything else means an hour.
pub fn calc_start(end: DateTime<Utc>, period: &str) -> DateTime<Utc> {
    match period {
        "day" => end - Duration::days(1),
        "week" => end - Duration::weeks(1),
        "month" => subtract_months(end, 1),
        _ => end - Duration::hours(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_subtract_months() {
        assert_eq!(subtract_months(utc(2014, 1, 1, 0), 1), utc(2013, 12, 1, 0));
        assert_eq!(subtract_months(utc(2013, 12, 1, 0), 2), utc(2013, 10, 1, 0));
        assert_eq!(subtract_months(utc(2013, 12, 1, 0), 12), utc(2012, 12, 1, 0));
        assert_eq!(subtract_months(utc(2014, 3, 31, 6), 1), utc(2014, 2, 28, 6));
    }

    #[test]
    fn test_calc_start() {
        let end = utc(2013, 12, 10, 12);
        assert_eq!(calc_start(end, "hour"), utc(2013, 12, 10, 11));
        assert_eq!(calc_start(end, "day"), utc(2013, 12, 9, 12));
        assert_eq!(calc_start(end, "week"), utc(2013, 12, 3, 12));
        assert_eq!(calc_start(end, "month"), utc(2013, 11, 10, 12));
        assert_eq!(calc_start(end, "fortnight"), utc(2013, 12, 10, 11));
    }
}
