//! Cron expression parsing

use std::fmt;

use chrono::{DateTime, TimeZone};
use croner::Cron;

/// A validated five-field cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
}

/// Why an expression was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleError(String);

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ScheduleError {}

impl CronSchedule {
    /// Parse `minute hour day-of-month month day-of-week`
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let expression = expression.trim();
        let fields = expression.split_whitespace().count();
        if fields != 5 {
            return Err(ScheduleError(format!(
                "expected 5 fields, got {} in '{}'",
                fields, expression
            )));
        }

        Cron::new(expression)
            .parse()
            .map_err(|e| ScheduleError(format!("'{}': {}", expression, e)))?;

        Ok(Self {
            expression: expression.to_string(),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`, in the same time zone
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        Cron::new(&self.expression)
            .parse()
            .ok()?
            .find_next_occurrence(after, false)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Utc};

    #[test]
    fn test_daily_at_two() {
        let schedule = CronSchedule::parse("0 2 * * *").unwrap();

        let before = Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap();
        let next = schedule.next_after(&before).unwrap();
        assert_eq!((next.day(), next.hour(), next.minute()), (1, 2, 0));

        let after = Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap();
        let next = schedule.next_after(&after).unwrap();
        assert_eq!((next.day(), next.hour()), (2, 2));
    }

    #[test]
    fn test_weekly() {
        // 2024-03-01 is a Friday
        let schedule = CronSchedule::parse("30 4 * * 1").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let next = schedule.next_after(&from).unwrap();
        assert_eq!(next.weekday(), chrono::Weekday::Mon);
        assert_eq!((next.day(), next.hour(), next.minute()), (4, 4, 30));
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        assert!(CronSchedule::parse("0 2 * *").is_err());
        assert!(CronSchedule::parse("0 0 2 * * *").is_err());
        assert!(CronSchedule::parse("").is_err());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(CronSchedule::parse("61 2 * * *").is_err());
        assert!(CronSchedule::parse("0 25 * * *").is_err());
    }
}
