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

//! The recurring scheduling protocol.
//!
//! [`PublishRecurringMessageScheduler`] turns "send this on that recurrence"
//! into a [`ScheduleRecurringMessage`] command and cancellations into
//! [`CancelScheduledRecurringMessage`] commands, both published to the
//! scheduling collaborator. The collaborator side is modelled by
//! [`RecurringScheduleConsumer`] over a [`JobScheduler`].

pub use commands::{
    CancelScheduledMessage, CancelScheduledRecurringMessage, ScheduleRecurringMessage,
    ScheduledRecurringMessage,
};
pub use initializer::{InitializedMessage, MessageInitializerRegistry, HEADER_PREFIX};
pub use job_scheduler::{
    InMemoryJobScheduler, JobKey, JobScheduler, JobSchedulerError, RecurringScheduleConsumer,
    TriggerKey,
};
pub use recurring_schedule::{MissedEventPolicy, RecurringSchedule};
pub use scheduler::PublishRecurringMessageScheduler;

mod commands;
mod initializer;
mod job_scheduler;
mod recurring_schedule;
mod scheduler;
