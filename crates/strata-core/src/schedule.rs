//! Sweep cadences.

use crate::error::{Result, StrataError};
use chrono::{DateTime, Duration, Utc};
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// When a recurring job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schedule {
    /// Cron expression with a seconds field (e.g. `"0 */5 * * * *"`).
    Cron {
        /// Cron expression string.
        expression: String,
    },
    /// Fixed interval in seconds.
    Interval {
        /// Number of seconds between runs.
        seconds: u64,
    },
}

impl Schedule {
    pub fn every_minutes(minutes: u64) -> Self {
        Self::Interval {
            seconds: minutes * 60,
        }
    }

    /// Calculate the next run time after the given time.
    pub fn next_run_time(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        match self {
            Self::Cron { expression } => {
                let schedule = CronSchedule::from_str(expression)?;
                Ok(schedule.after(&after).next())
            }
            Self::Interval { seconds } => {
                let next = after + Duration::seconds(*seconds as i64);
                Ok(Some(next))
            }
        }
    }

    /// Validate the schedule configuration.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Cron { expression } => {
                CronSchedule::from_str(expression)?;
                Ok(())
            }
            Self::Interval { seconds } => {
                if *seconds == 0 {
                    return Err(StrataError::InvalidSchedule(
                        "Interval must be greater than 0".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::every_minutes(5)
    }
}
