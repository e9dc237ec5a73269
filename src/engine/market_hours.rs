use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Asia::Kolkata;

/// NSE equity session, Monday to Friday 09:15 to 15:30 IST.
///
/// Exchange holidays are not tracked; on a holiday the feed simply
/// returns nothing and the loops idle through an empty session.

fn session_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap()
}

fn session_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).unwrap()
}

pub fn is_trading_day(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Whether the exchange is open at `now`. The close boundary is
/// exclusive: 15:30:00 is already closed.
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    let ist = now.with_timezone(&Kolkata);

    if !is_trading_day(ist.weekday()) {
        return false;
    }

    let t = ist.time();
    t >= session_open() && t < session_close()
}

/// Next 09:15 IST on a trading day at or after `now`.
pub fn next_session_open(now: DateTime<Utc>) -> DateTime<Utc> {
    let ist = now.with_timezone(&Kolkata);
    let mut day = ist.date_naive();

    if ist.time() >= session_open() {
        day = day.succ_opt().unwrap_or(day);
    }

    while !is_trading_day(day.weekday()) {
        day = day.succ_opt().unwrap_or(day);
    }

    // IST has no DST, so local times are never ambiguous
    Kolkata
        .from_local_datetime(&day.and_time(session_open()))
        .unwrap()
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-01 was a Friday
    fn ist(day: u32, hh: u32, mm: u32, ss: u32) -> DateTime<Utc> {
        Kolkata
            .with_ymd_and_hms(2024, 3, day, hh, mm, ss)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_open_during_session() {
        assert!(is_market_open(ist(1, 9, 15, 0)));
        assert!(is_market_open(ist(1, 12, 0, 0)));
        assert!(is_market_open(ist(1, 15, 29, 59)));
    }

    #[test]
    fn test_closed_outside_session_hours() {
        assert!(!is_market_open(ist(1, 9, 14, 59)));
        assert!(!is_market_open(ist(1, 15, 30, 0)));
        assert!(!is_market_open(ist(1, 20, 0, 0)));
    }

    #[test]
    fn test_closed_on_weekends() {
        assert!(!is_market_open(ist(2, 12, 0, 0))); // Saturday
        assert!(!is_market_open(ist(3, 12, 0, 0))); // Sunday
    }

    #[test]
    fn test_next_open_same_day_before_bell() {
        let next = next_session_open(ist(1, 7, 0, 0));
        assert_eq!(next, ist(1, 9, 15, 0));
    }

    #[test]
    fn test_next_open_rolls_past_weekend() {
        // Friday evening and Saturday both land on Monday
        assert_eq!(next_session_open(ist(1, 16, 0, 0)), ist(4, 9, 15, 0));
        assert_eq!(next_session_open(ist(2, 10, 0, 0)), ist(4, 9, 15, 0));
    }

    #[test]
    fn test_next_open_during_session_is_tomorrow() {
        assert_eq!(next_session_open(ist(1, 10, 0, 0)), ist(4, 9, 15, 0));
    }
}
