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

use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use crate::scheduling::RecurringSchedule;
use crate::traits::{BusMessage, MessageType};

/// Command asking the scheduling collaborator to deliver `payload` to
/// `destination` on every occurrence of `schedule`.
#[crate::bus_message]
pub struct ScheduleRecurringMessage {
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub schedule: RecurringSchedule,
    pub destination: Url,
    /// URNs of the payload's message type, most specific first.
    pub payload_type: Vec<String>,
    pub payload: Arc<dyn BusMessage>,
}

impl ScheduleRecurringMessage {
    pub fn new(schedule: RecurringSchedule, destination: Url, payload: Arc<dyn BusMessage>) -> Self {
        let message_type: MessageType = (*payload).message_type();
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            schedule,
            destination,
            payload_type: vec![message_type.urn()],
            payload,
        }
    }

    /// The payload as `T`, if that is its type.
    pub fn payload_as<T: BusMessage>(&self) -> Option<&T> {
        (*self.payload).as_any().downcast_ref::<T>()
    }
}

/// Command cancelling every future occurrence of a recurring schedule.
#[crate::bus_message(serde)]
pub struct CancelScheduledRecurringMessage {
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub schedule_id: String,
    pub schedule_group: String,
}

impl CancelScheduledRecurringMessage {
    pub fn new(schedule_id: impl Into<String>, schedule_group: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            schedule_id: schedule_id.into(),
            schedule_group: schedule_group.into(),
        }
    }
}

/// Command cancelling a one-shot scheduled message by its token.
#[crate::bus_message(serde)]
pub struct CancelScheduledMessage {
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub token_id: Uuid,
}

impl CancelScheduledMessage {
    pub fn new(token_id: Uuid) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            token_id,
        }
    }
}

/// What a caller gets back after scheduling: the inputs plus the
/// materialized payload.
///
/// The handle grants no control. Cancel by `(schedule_id, schedule_group)`.
#[derive(Debug)]
pub struct ScheduledRecurringMessage<T: ?Sized> {
    pub schedule: RecurringSchedule,
    pub destination: Url,
    pub payload: Arc<T>,
}

impl<T: ?Sized> Clone for ScheduledRecurringMessage<T> {
    fn clone(&self) -> Self {
        Self {
            schedule: self.schedule.clone(),
            destination: self.destination.clone(),
            payload: Arc::clone(&self.payload),
        }
    }
}
