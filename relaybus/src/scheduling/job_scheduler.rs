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

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::common::{BusError, SchedulingConfig, CONFIG};
use crate::message::ConsumeContext;
use crate::scheduling::{CancelScheduledMessage, CancelScheduledRecurringMessage, ScheduleRecurringMessage};
use crate::traits::Consumer;

/// Identity of a trigger in the job scheduler's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerKey {
    pub name: String,
    pub group: String,
}

impl TriggerKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// The trigger of a recurring schedule: `prefix` is prepended to
    /// `schedule_id` unless it is already there.
    pub fn recurring(prefix: &str, schedule_id: &str, schedule_group: &str) -> Self {
        let name = if schedule_id.starts_with(prefix) {
            schedule_id.to_string()
        } else {
            format!("{prefix}{schedule_id}")
        };
        Self::new(name, schedule_group)
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Identity of a job in the job scheduler's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// The job of a one-shot scheduled message, named by its token in
    /// hyphen-less form.
    pub fn for_token(token_id: Uuid, group: impl Into<String>) -> Self {
        Self::new(token_id.simple().to_string(), group)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Errors a job scheduler reports.
#[derive(Debug, thiserror::Error)]
pub enum JobSchedulerError {
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The external scheduler that stores jobs and fires their triggers.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Stores `command` as `job`, fired by `trigger`. Replaces an existing
    /// job and trigger with the same keys.
    async fn schedule_recurring(
        &self,
        job: JobKey,
        trigger: TriggerKey,
        command: ScheduleRecurringMessage,
    ) -> Result<(), JobSchedulerError>;

    /// Removes `trigger`. Returns `false` when it did not exist.
    async fn unschedule_trigger(&self, trigger: &TriggerKey) -> Result<bool, JobSchedulerError>;

    /// Removes `job` and its triggers. Returns `false` when it did not exist.
    async fn delete_job(&self, job: &JobKey) -> Result<bool, JobSchedulerError>;
}

/// The scheduling collaborator's consumer side.
///
/// Maps schedule and cancel commands onto a [`JobScheduler`]. Trigger names
/// get the configured recurring prefix here, and nowhere else. Cancelling a
/// schedule that does not exist is logged and succeeds.
pub struct RecurringScheduleConsumer {
    scheduler: Arc<dyn JobScheduler>,
    trigger_prefix: String,
    default_group: String,
}

impl fmt::Debug for RecurringScheduleConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecurringScheduleConsumer")
            .field("trigger_prefix", &self.trigger_prefix)
            .field("default_group", &self.default_group)
            .finish_non_exhaustive()
    }
}

impl RecurringScheduleConsumer {
    /// Creates the consumer using the global scheduling configuration.
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
        Self::with_config(scheduler, &CONFIG.scheduling)
    }

    pub fn with_config(scheduler: Arc<dyn JobScheduler>, config: &SchedulingConfig) -> Self {
        Self {
            scheduler,
            trigger_prefix: config.recurring_trigger_prefix.clone(),
            default_group: config.default_schedule_group.clone(),
        }
    }

    fn failure(operation: String, error: JobSchedulerError) -> BusError {
        BusError::collaborator("job scheduler", operation, error)
    }
}

#[async_trait]
impl Consumer<ScheduleRecurringMessage> for RecurringScheduleConsumer {
    #[instrument(skip_all, fields(schedule_id = %context.message().schedule.schedule_id))]
    async fn consume(&self, context: &ConsumeContext<ScheduleRecurringMessage>) -> Result<(), BusError> {
        let command = context.message();
        let schedule = &command.schedule;
        let job = JobKey::new(schedule.schedule_id.clone(), schedule.schedule_group.clone());
        let trigger = TriggerKey::recurring(
            &self.trigger_prefix,
            &schedule.schedule_id,
            &schedule.schedule_group,
        );
        self.scheduler
            .schedule_recurring(job, trigger.clone(), command.clone())
            .await
            .map_err(|error| Self::failure(format!("schedule {trigger}"), error))?;
        debug!(trigger = %trigger, destination = %command.destination, "Scheduled recurring message");
        Ok(())
    }
}

#[async_trait]
impl Consumer<CancelScheduledRecurringMessage> for RecurringScheduleConsumer {
    #[instrument(skip_all, fields(schedule_id = %context.message().schedule_id))]
    async fn consume(&self, context: &ConsumeContext<CancelScheduledRecurringMessage>) -> Result<(), BusError> {
        let command = context.message();
        let trigger = TriggerKey::recurring(
            &self.trigger_prefix,
            &command.schedule_id,
            &command.schedule_group,
        );
        let unscheduled = self
            .scheduler
            .unschedule_trigger(&trigger)
            .await
            .map_err(|error| Self::failure(format!("unschedule {trigger}"), error))?;
        if unscheduled {
            debug!(
                schedule_id = %command.schedule_id,
                schedule_group = %command.schedule_group,
                timestamp = %command.timestamp,
                "Cancelled recurring scheduled message"
            );
        } else {
            debug!(
                schedule_id = %command.schedule_id,
                schedule_group = %command.schedule_group,
                "No recurring scheduled message found"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Consumer<CancelScheduledMessage> for RecurringScheduleConsumer {
    #[instrument(skip_all, fields(token_id = %context.message().token_id))]
    async fn consume(&self, context: &ConsumeContext<CancelScheduledMessage>) -> Result<(), BusError> {
        let command = context.message();
        let job = JobKey::for_token(command.token_id, self.default_group.clone());
        let deleted = self
            .scheduler
            .delete_job(&job)
            .await
            .map_err(|error| Self::failure(format!("delete {job}"), error))?;
        if deleted {
            debug!(job = %job, timestamp = %command.timestamp, "Cancelled scheduled message");
        } else {
            debug!(job = %job, "No scheduled message found");
        }
        Ok(())
    }
}

/// A job scheduler kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryJobScheduler {
    jobs: DashMap<JobKey, ScheduleRecurringMessage>,
    triggers: DashMap<TriggerKey, JobKey>,
}

impl InMemoryJobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_trigger(&self, trigger: &TriggerKey) -> bool {
        self.triggers.contains_key(trigger)
    }

    pub fn has_job(&self, job: &JobKey) -> bool {
        self.jobs.contains_key(job)
    }

    pub fn job(&self, job: &JobKey) -> Option<ScheduleRecurringMessage> {
        self.jobs.get(job).map(|entry| entry.value().clone())
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }
}

#[async_trait]
impl JobScheduler for InMemoryJobScheduler {
    async fn schedule_recurring(
        &self,
        job: JobKey,
        trigger: TriggerKey,
        command: ScheduleRecurringMessage,
    ) -> Result<(), JobSchedulerError> {
        self.jobs.insert(job.clone(), command);
        self.triggers.insert(trigger, job);
        Ok(())
    }

    async fn unschedule_trigger(&self, trigger: &TriggerKey) -> Result<bool, JobSchedulerError> {
        let Some((_, job)) = self.triggers.remove(trigger) else {
            return Ok(false);
        };
        // A job without triggers is removed with its last trigger.
        if !self.triggers.iter().any(|entry| *entry.value() == job) {
            self.jobs.remove(&job);
        }
        Ok(true)
    }

    async fn delete_job(&self, job: &JobKey) -> Result<bool, JobSchedulerError> {
        let existed = self.jobs.remove(job).is_some();
        self.triggers.retain(|_, owner| *owner != *job);
        Ok(existed)
    }
}
