use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Next occurrence of `at` strictly after `now`: today if still ahead,
/// otherwise the same time tomorrow.
pub fn next_cycle_at(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn test_before_cycle_time_runs_today() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 0).unwrap();
        assert_eq!(next_cycle_at(now, nine()), Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_past_cycle_time_runs_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap();
        assert_eq!(next_cycle_at(now, nine()), Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap());

        // Exactly on time counts as past
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        assert_eq!(next_cycle_at(now, nine()), Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_month_rollover() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 23, 0, 0).unwrap();
        assert_eq!(next_cycle_at(now, nine()), Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
    }
}
