//! Schedule specification model
//!
//! A schedule is a recurrence kind plus a wall-clock `time` interpreted in
//! an IANA `timezone`. The next-firing computation lives in the
//! `shipnote-schedule` crate; this module is the persisted shape only.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Day of week for `specific_weekdays` schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl Weekday {
    /// Map from chrono's weekday representation
    pub fn from_chrono(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Sun => Weekday::Sun,
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
        }
    }
}

/// Recurrence kind with its kind-specific configuration.
///
/// Serialises as `{"type": "...", "config": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Every day at the configured local time
    Daily,
    /// On each listed weekday at the configured local time
    SpecificWeekdays { weekdays: Vec<Weekday> },
    /// Every `interval_days` days at the configured local time
    FixedInterval { interval_days: u32 },
    /// On `day_of_month` each month; months without that day use their
    /// last day
    MonthlyDate { day_of_month: u32 },
    /// Once a year on (month, day)
    Yearly { month: u32, day: u32 },
    /// Fire once at `date`, if it is still in the future
    OneTime {
        #[serde(default)]
        date: Option<chrono::DateTime<chrono::Utc>>,
    },
}

/// Persisted schedule specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    #[serde(flatten)]
    pub kind: ScheduleKind,
    /// Wall-clock firing time in `timezone`
    pub time: NaiveTime,
    /// IANA zone identifier; an unrecognised value falls back to UTC
    pub timezone: String,
    /// Inactive schedules are invisible to the due query
    pub is_active: bool,
}

impl ScheduleSpec {
    pub fn daily(time: NaiveTime, timezone: impl Into<String>) -> Self {
        Self {
            kind: ScheduleKind::Daily,
            time,
            timezone: timezone.into(),
            is_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_has_type_and_config() {
        let spec = ScheduleSpec {
            kind: ScheduleKind::SpecificWeekdays {
                weekdays: vec![Weekday::Mon, Weekday::Fri],
            },
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            timezone: "America/New_York".to_string(),
            is_active: true,
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "specific_weekdays");
        assert_eq!(json["config"]["weekdays"][0], "mon");
        assert_eq!(json["timezone"], "America/New_York");
    }

    #[test]
    fn daily_has_no_config_payload() {
        let spec = ScheduleSpec::daily(
            NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            "Asia/Kolkata",
        );
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "daily");
        let round: ScheduleSpec = serde_json::from_value(json).unwrap();
        assert_eq!(round, spec);
    }
}
