//! Cron schedule validation and evaluation.
//!
//! Expressions are standard five-field cron, evaluated in UTC.

use crate::error::ScheduleError;
use chrono::{DateTime, Duration, Utc};
use croner::Cron;

/// Minimum spacing between two firings of one schedule.
pub const MIN_INTERVAL: Duration = Duration::hours(1);

/// Consecutive occurrences inspected when checking the minimum interval.
const INTERVAL_SAMPLE: usize = 48;

/// A parsed cron schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    /// Parses a five-field expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not have exactly five fields
    /// or does not parse.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let fields = expression.split_whitespace().count();
        if fields != 5 {
            return Err(ScheduleError::InvalidCronExpression {
                expression: expression.to_string(),
                reason: format!("cron expressions must have exactly 5 fields, got {fields}"),
            });
        }
        let cron = expression
            .parse::<Cron>()
            .map_err(|e| ScheduleError::InvalidCronExpression {
                expression: expression.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            expression: expression.to_string(),
            cron,
        })
    }

    /// Parses an expression and checks it fires at most once per hour.
    ///
    /// Returns the schedule and its first occurrence after `now`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCronExpression` for unparseable input and
    /// `TooFrequent` when two consecutive occurrences are closer than
    /// [`MIN_INTERVAL`].
    pub fn validate(
        expression: &str,
        now: DateTime<Utc>,
    ) -> Result<(Self, DateTime<Utc>), ScheduleError> {
        let schedule = Self::parse(expression)?;
        let occurrences: Vec<_> = schedule.cron.iter_after(now).take(INTERVAL_SAMPLE).collect();
        let Some(first) = occurrences.first().copied() else {
            return Err(ScheduleError::InvalidCronExpression {
                expression: expression.to_string(),
                reason: "expression never fires".to_string(),
            });
        };
        if let Some(shortest) = occurrences.windows(2).map(|w| w[1] - w[0]).min()
            && shortest < MIN_INTERVAL
        {
            return Err(ScheduleError::TooFrequent {
                expression: expression.to_string(),
                interval_minutes: shortest.num_minutes(),
            });
        }
        Ok((schedule, first))
    }

    /// Returns the expression text.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Returns the first occurrence strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.iter_after(after).next()
    }
}
