/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{BusError, CONFIG};

/// What the scheduler does with occurrences missed while it was down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissedEventPolicy {
    /// Let the scheduler decide.
    #[default]
    Default,
    /// Drop missed occurrences.
    Skip,
    /// Deliver one message for the missed occurrences.
    Send,
}

/// A repeating delivery, identified by `(schedule_id, schedule_group)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub schedule_id: String,
    pub schedule_group: String,
    /// Cron expression understood by the scheduling collaborator.
    pub cron_expression: String,
    pub time_zone_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub misfire_policy: MissedEventPolicy,
    pub description: Option<String>,
}

impl RecurringSchedule {
    /// A schedule starting now.
    pub fn new(
        schedule_id: impl Into<String>,
        schedule_group: impl Into<String>,
        cron_expression: impl Into<String>,
    ) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            schedule_group: schedule_group.into(),
            cron_expression: cron_expression.into(),
            time_zone_id: None,
            start_time: Utc::now(),
            end_time: None,
            misfire_policy: MissedEventPolicy::default(),
            description: None,
        }
    }

    /// A schedule in the configured default group.
    pub fn in_default_group(schedule_id: impl Into<String>, cron_expression: impl Into<String>) -> Self {
        Self::new(
            schedule_id,
            CONFIG.scheduling.default_schedule_group.clone(),
            cron_expression,
        )
    }

    #[must_use]
    pub fn time_zone(mut self, time_zone_id: impl Into<String>) -> Self {
        self.time_zone_id = Some(time_zone_id.into());
        self
    }

    #[must_use]
    pub fn starting_at(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    #[must_use]
    pub fn ending_at(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    #[must_use]
    pub fn misfire_policy(mut self, policy: MissedEventPolicy) -> Self {
        self.misfire_policy = policy;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checks the fields the scheduler needs before anything is published.
    ///
    /// # Errors
    ///
    /// [`BusError::ArgumentInvalid`] naming the first missing field, or an
    /// end time not after the start time.
    pub fn validate(&self) -> Result<(), BusError> {
        validate_key(&self.schedule_id, &self.schedule_group)?;
        if self.cron_expression.trim().is_empty() {
            return Err(BusError::argument("cron_expression", "must not be empty"));
        }
        if let Some(end_time) = self.end_time {
            if end_time <= self.start_time {
                return Err(BusError::argument("end_time", "must be after start_time"));
            }
        }
        Ok(())
    }
}

/// Both halves of a schedule key are required.
pub(crate) fn validate_key(schedule_id: &str, schedule_group: &str) -> Result<(), BusError> {
    if schedule_id.trim().is_empty() {
        return Err(BusError::argument("schedule_id", "must not be empty"));
    }
    if schedule_group.trim().is_empty() {
        return Err(BusError::argument("schedule_group", "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn validation_names_the_missing_field() {
        let schedule = RecurringSchedule::new("", "reports", "0 0 * * * ?");
        assert!(matches!(
            schedule.validate(),
            Err(BusError::ArgumentInvalid { argument: "schedule_id", .. })
        ));

        let schedule = RecurringSchedule::new("nightly", "reports", "0 0 * * * ?");
        let ended = schedule.clone().ending_at(schedule.start_time - Duration::minutes(1));
        assert!(matches!(
            ended.validate(),
            Err(BusError::ArgumentInvalid { argument: "end_time", .. })
        ));
        assert!(schedule.validate().is_ok());
    }

    #[test]
    fn default_group_comes_from_configuration() {
        let schedule = RecurringSchedule::in_default_group("nightly", "0 0 * * * ?");
        assert_eq!(schedule.schedule_group, CONFIG.scheduling.default_schedule_group);
    }
}
