//! Next-firing calculator
//!
//! Pure function from a schedule spec and a reference instant to the next
//! absolute firing instant. The spec's `time` is a wall-clock in its IANA
//! `timezone`; the returned instant converts back into that zone at exactly
//! the specified wall-clock. A candidate equal to `now` is rejected.
//!
//! DST rules: a wall-clock skipped by a spring-forward gap resolves to the
//! first valid instant after the gap; a wall-clock repeated by a fall-back
//! fold resolves to its first occurrence.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use shipnote_core::schedule::{ScheduleKind, ScheduleSpec, Weekday};

/// Compute the next firing instant strictly after `now`, or None for an
/// exhausted one-time schedule (or a degenerate spec such as an empty
/// weekday set).
pub fn next_firing(spec: &ScheduleSpec, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz = parse_timezone(&spec.timezone);
    let today = now.with_timezone(&tz).date_naive();

    match &spec.kind {
        ScheduleKind::Daily => {
            // Today may still qualify if the firing time is ahead of `now`.
            first_after(now, spec.time, tz, (0..=2i64).filter_map(days_from(today)))
        }
        ScheduleKind::SpecificWeekdays { weekdays } => {
            if weekdays.is_empty() {
                return None;
            }
            let dates = (0..=7i64)
                .filter_map(days_from(today))
                .filter(|d| weekdays.contains(&Weekday::from_chrono(d.weekday())));
            first_after(now, spec.time, tz, dates)
        }
        ScheduleKind::FixedInterval { interval_days } => {
            let step = (*interval_days).max(1) as i64;
            first_after(
                now,
                spec.time,
                tz,
                (1..=2).filter_map(|k| today.checked_add_signed(Duration::days(step * k))),
            )
        }
        ScheduleKind::MonthlyDate { day_of_month } => {
            let dates = (0..=2).filter_map(|k| month_candidate(today, k, *day_of_month));
            first_after(now, spec.time, tz, dates)
        }
        ScheduleKind::Yearly { month, day } => {
            if !(1..=12).contains(month) {
                return None;
            }
            let dates = (0..=1).filter_map(|k| {
                let year = today.year() + k;
                NaiveDate::from_ymd_opt(year, *month, (*day).min(days_in_month(year, *month)))
            });
            first_after(now, spec.time, tz, dates)
        }
        ScheduleKind::OneTime { date } => (*date).filter(|d| *d > now),
    }
}

/// Parse an IANA zone identifier, falling back to UTC when unrecognised.
pub fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or(Tz::UTC)
}

fn days_from(base: NaiveDate) -> impl Fn(i64) -> Option<NaiveDate> {
    move |offset| base.checked_add_signed(Duration::days(offset))
}

/// First candidate strictly after `now`.
fn first_after(
    now: DateTime<Utc>,
    time: NaiveTime,
    tz: Tz,
    dates: impl Iterator<Item = NaiveDate>,
) -> Option<DateTime<Utc>> {
    dates
        .map(|date| resolve_local(date, time, tz))
        .find(|candidate| *candidate > now)
}

/// Turn a local wall-clock into an absolute instant under the DST rules.
fn resolve_local(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // Fold: the wall-clock occurs twice; take the first occurrence.
        LocalResult::Ambiguous(first, _) => first.with_timezone(&Utc),
        // Gap: step forward minute by minute until the zone resolves.
        LocalResult::None => {
            let mut probe = naive;
            for _ in 0..360 {
                probe += Duration::minutes(1);
                match tz.from_local_datetime(&probe) {
                    LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                        return dt.with_timezone(&Utc);
                    }
                    LocalResult::None => continue,
                }
            }
            // No real zone has a gap this wide; treat the wall-clock as UTC.
            Utc.from_utc_datetime(&naive)
        }
    }
}

/// The `day_of_month` candidate `months_ahead` months from `base`'s month,
/// clamped to the month's last day.
fn month_candidate(base: NaiveDate, months_ahead: u32, day_of_month: u32) -> Option<NaiveDate> {
    let zero_based = base.month0() + months_ahead;
    let year = base.year() + (zero_based / 12) as i32;
    let month = zero_based % 12 + 1;
    let day = day_of_month.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use shipnote_core::schedule::ScheduleSpec;
    use test_case::test_case;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn spec(kind: ScheduleKind, time: NaiveTime, tz: &str) -> ScheduleSpec {
        ScheduleSpec {
            kind,
            time,
            timezone: tz.to_string(),
            is_active: true,
        }
    }

    #[test]
    fn daily_fires_later_today_when_time_ahead() {
        let s = spec(ScheduleKind::Daily, at(9, 0), "UTC");
        let now = utc(2024, 6, 1, 7, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 6, 1, 9, 0)));
    }

    #[test]
    fn daily_rolls_to_tomorrow_when_time_passed() {
        let s = spec(ScheduleKind::Daily, at(9, 0), "UTC");
        let now = utc(2024, 6, 1, 9, 30);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 6, 2, 9, 0)));
    }

    #[test]
    fn candidate_equal_to_now_is_rejected() {
        let s = spec(ScheduleKind::Daily, at(9, 0), "UTC");
        let now = utc(2024, 6, 1, 9, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 6, 2, 9, 0)));
    }

    #[test]
    fn weekday_schedule_lands_on_next_listed_day() {
        // Mon/Wed/Fri 09:00 New York from a Saturday (UTC midnight):
        // Monday June 3rd, 09:00 EDT = 13:00 UTC.
        let s = spec(
            ScheduleKind::SpecificWeekdays {
                weekdays: vec![Weekday::Mon, Weekday::Wed, Weekday::Fri],
            },
            at(9, 0),
            "America/New_York",
        );
        let now = utc(2024, 6, 1, 0, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 6, 3, 13, 0)));
    }

    #[test]
    fn weekday_schedule_with_empty_set_is_degenerate() {
        let s = spec(
            ScheduleKind::SpecificWeekdays { weekdays: vec![] },
            at(9, 0),
            "UTC",
        );
        assert_eq!(next_firing(&s, utc(2024, 6, 1, 0, 0)), None);
    }

    #[test]
    fn dst_gap_resolves_past_skipped_hour() {
        // 2024-03-10 02:30 never exists in New York; the clock jumps from
        // 02:00 EST to 03:00 EDT. Expect 03:00 EDT = 07:00 UTC.
        let s = spec(ScheduleKind::Daily, at(2, 30), "America/New_York");
        let now = utc(2024, 3, 10, 6, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 3, 10, 7, 0)));
    }

    #[test]
    fn dst_fold_takes_first_occurrence() {
        // 2024-11-03 01:30 occurs twice in New York; the first is EDT
        // (UTC-4), i.e. 05:30 UTC.
        let s = spec(ScheduleKind::Daily, at(1, 30), "America/New_York");
        let now = utc(2024, 11, 3, 0, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 11, 3, 5, 30)));
    }

    #[test]
    fn invalid_timezone_falls_back_to_utc() {
        let s = spec(ScheduleKind::Daily, at(9, 0), "Not/AZone");
        let now = utc(2024, 6, 1, 7, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 6, 1, 9, 0)));
    }

    #[test]
    fn fixed_interval_counts_from_today() {
        let s = spec(
            ScheduleKind::FixedInterval { interval_days: 3 },
            at(6, 0),
            "UTC",
        );
        let now = utc(2024, 6, 1, 12, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 6, 4, 6, 0)));
    }

    #[test_case(31, utc(2024, 4, 2, 0, 0), utc(2024, 4, 30, 8, 0) ; "april clamps 31 to 30")]
    #[test_case(15, utc(2024, 6, 20, 0, 0), utc(2024, 7, 15, 8, 0) ; "rolls to next month when passed")]
    #[test_case(1, utc(2024, 1, 31, 10, 0), utc(2024, 2, 1, 8, 0) ; "first of next month")]
    fn monthly_date_cases(day: u32, now: DateTime<Utc>, expected: DateTime<Utc>) {
        let s = spec(
            ScheduleKind::MonthlyDate { day_of_month: day },
            at(8, 0),
            "UTC",
        );
        assert_eq!(next_firing(&s, now), Some(expected));
    }

    #[test]
    fn monthly_date_in_february_leap_year() {
        let s = spec(
            ScheduleKind::MonthlyDate { day_of_month: 30 },
            at(8, 0),
            "UTC",
        );
        let now = utc(2024, 2, 1, 0, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 2, 29, 8, 0)));
    }

    #[test]
    fn yearly_rolls_to_next_year_when_passed() {
        let s = spec(
            ScheduleKind::Yearly { month: 3, day: 15 },
            at(10, 0),
            "UTC",
        );
        let now = utc(2024, 5, 1, 0, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2025, 3, 15, 10, 0)));
    }

    #[test]
    fn yearly_invalid_month_is_degenerate() {
        let s = spec(ScheduleKind::Yearly { month: 13, day: 1 }, at(10, 0), "UTC");
        assert_eq!(next_firing(&s, utc(2024, 1, 1, 0, 0)), None);
    }

    #[test]
    fn one_time_future_date_fires_once() {
        let when = utc(2024, 7, 1, 12, 0);
        let s = spec(ScheduleKind::OneTime { date: Some(when) }, at(0, 0), "UTC");
        assert_eq!(next_firing(&s, utc(2024, 6, 1, 0, 0)), Some(when));
        assert_eq!(next_firing(&s, when), None, "equal to now is rejected");
        assert_eq!(next_firing(&s, utc(2024, 8, 1, 0, 0)), None);
    }

    #[test]
    fn one_time_without_date_never_fires() {
        let s = spec(ScheduleKind::OneTime { date: None }, at(0, 0), "UTC");
        assert_eq!(next_firing(&s, utc(2024, 6, 1, 0, 0)), None);
    }

    #[test]
    fn kolkata_daily_is_half_hour_offset() {
        // 09:00 IST = 03:30 UTC.
        let s = spec(ScheduleKind::Daily, at(9, 0), "Asia/Kolkata");
        let now = utc(2024, 6, 1, 0, 0);
        assert_eq!(next_firing(&s, now), Some(utc(2024, 6, 1, 3, 30)));
    }

    #[test]
    fn returned_instant_matches_wall_clock_in_zone() {
        let s = spec(ScheduleKind::Daily, at(9, 0), "America/New_York");
        let fired = next_firing(&s, utc(2024, 6, 1, 0, 0)).unwrap();
        let local = fired.with_timezone(&chrono_tz::America::New_York);
        assert_eq!(local.time(), at(9, 0));
    }
}
