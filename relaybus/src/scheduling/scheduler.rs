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

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use crate::common::BusError;
use crate::message::{PublishEndpoint, SendContext};
use crate::pipeline::ProbeContext;
use crate::scheduling::recurring_schedule::validate_key;
use crate::scheduling::{
    CancelScheduledMessage, CancelScheduledRecurringMessage, MessageInitializerRegistry,
    RecurringSchedule, ScheduleRecurringMessage, ScheduledRecurringMessage,
};
use crate::traits::{BusMessage, MessageType, Pipe, Probe};

/// Schedules recurring sends by publishing commands to the scheduling
/// collaborator.
///
/// Every entry point ends in the same publish path; they differ only in how
/// the payload is obtained and whether a payload pipe runs.
#[derive(Debug, Clone)]
pub struct PublishRecurringMessageScheduler {
    endpoint: PublishEndpoint,
    initializers: MessageInitializerRegistry,
}

impl PublishRecurringMessageScheduler {
    pub fn new(endpoint: PublishEndpoint, initializers: MessageInitializerRegistry) -> Self {
        Self {
            endpoint,
            initializers,
        }
    }

    /// Schedules `message` for delivery to `destination` on every occurrence of `schedule`.
    ///
    /// # Errors
    ///
    /// [`BusError::ArgumentInvalid`] for an incomplete schedule, before any
    /// I/O; otherwise the publish error.
    pub async fn schedule_recurring_send<M: BusMessage>(
        &self,
        destination: Url,
        schedule: RecurringSchedule,
        message: M,
    ) -> Result<ScheduledRecurringMessage<M>, BusError> {
        let payload = Arc::new(message);
        let erased: Arc<dyn BusMessage> = Arc::clone(&payload) as Arc<dyn BusMessage>;
        self.schedule(destination, schedule, payload, erased, None).await
    }

    /// Like [`Self::schedule_recurring_send`], running `pipe` over a context
    /// carrying the payload. Headers set there travel on the command.
    pub async fn schedule_recurring_send_with<M: BusMessage>(
        &self,
        destination: Url,
        schedule: RecurringSchedule,
        message: M,
        pipe: Arc<dyn Pipe<SendContext<M>>>,
    ) -> Result<ScheduledRecurringMessage<M>, BusError> {
        let payload = Arc::new(message);
        let erased: Arc<dyn BusMessage> = Arc::clone(&payload) as Arc<dyn BusMessage>;
        self.schedule(destination, schedule, payload, erased, Some(pipe)).await
    }

    /// Schedules a message whose type is known only at runtime.
    pub async fn schedule_recurring_send_dyn(
        &self,
        destination: Url,
        schedule: RecurringSchedule,
        message: Arc<dyn BusMessage>,
        pipe: Option<Arc<dyn Pipe<SendContext<dyn BusMessage>>>>,
    ) -> Result<ScheduledRecurringMessage<dyn BusMessage>, BusError> {
        let erased = Arc::clone(&message);
        self.schedule(destination, schedule, message, erased, pipe).await
    }

    /// Builds an `M` from `values` with the initializer registry, then schedules it.
    ///
    /// # Errors
    ///
    /// [`BusError::ArgumentInvalid`] when `values` cannot initialize an `M`.
    pub async fn schedule_recurring_send_values<M: BusMessage>(
        &self,
        destination: Url,
        schedule: RecurringSchedule,
        values: Value,
        pipe: Option<Arc<dyn Pipe<SendContext<M>>>>,
    ) -> Result<ScheduledRecurringMessage<M>, BusError> {
        schedule.validate()?;
        let initialized = self.initializers.initialize::<M>(values, pipe)?;
        let payload = Arc::new(initialized.message);
        let erased: Arc<dyn BusMessage> = Arc::clone(&payload) as Arc<dyn BusMessage>;
        self.schedule(destination, schedule, payload, erased, Some(initialized.pipe))
            .await
    }

    /// Cancels every future occurrence of `(schedule_id, schedule_group)`.
    ///
    /// Succeeds whether or not such a schedule exists; matching is up to the
    /// scheduling collaborator.
    #[instrument(skip(self))]
    pub async fn cancel_scheduled_recurring_send(
        &self,
        schedule_id: &str,
        schedule_group: &str,
    ) -> Result<(), BusError> {
        validate_key(schedule_id, schedule_group)?;
        let command = CancelScheduledRecurringMessage::new(schedule_id, schedule_group);
        let correlation_id = command.correlation_id;
        self.endpoint
            .publish_with(command, &CorrelatePipe::<CancelScheduledRecurringMessage>::new(correlation_id, None))
            .await
    }

    /// Cancels a one-shot scheduled message by its token.
    #[instrument(skip(self))]
    pub async fn cancel_scheduled_send(&self, token_id: Uuid) -> Result<(), BusError> {
        let command = CancelScheduledMessage::new(token_id);
        let correlation_id = command.correlation_id;
        self.endpoint
            .publish_with(command, &CorrelatePipe::<CancelScheduledMessage>::new(correlation_id, None))
            .await
    }

    async fn schedule<T>(
        &self,
        destination: Url,
        schedule: RecurringSchedule,
        payload: Arc<T>,
        erased: Arc<dyn BusMessage>,
        pipe: Option<Arc<dyn Pipe<SendContext<T>>>>,
    ) -> Result<ScheduledRecurringMessage<T>, BusError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let payload_pipe = pipe.map(|pipe| PayloadContextPipe {
            payload: Arc::clone(&payload),
            message_type: (*erased).message_type(),
            pipe,
        });
        let (schedule, destination) = self
            .publish_schedule(
                destination,
                schedule,
                erased,
                payload_pipe
                    .as_ref()
                    .map(|pipe| pipe as &dyn Pipe<SendContext<ScheduleRecurringMessage>>),
            )
            .await?;
        Ok(ScheduledRecurringMessage {
            schedule,
            destination,
            payload,
        })
    }

    #[instrument(skip_all, fields(schedule_id = %schedule.schedule_id, schedule_group = %schedule.schedule_group))]
    async fn publish_schedule(
        &self,
        destination: Url,
        schedule: RecurringSchedule,
        payload: Arc<dyn BusMessage>,
        pipe: Option<&dyn Pipe<SendContext<ScheduleRecurringMessage>>>,
    ) -> Result<(RecurringSchedule, Url), BusError> {
        schedule.validate()?;
        let command = ScheduleRecurringMessage::new(schedule.clone(), destination.clone(), payload);
        debug!(destination = %destination, payload_type = ?command.payload_type, "Scheduling recurring message");

        let correlate = CorrelatePipe::new(command.correlation_id, pipe);
        self.endpoint.publish_with(command, &correlate).await?;
        Ok((schedule, destination))
    }
}

/// Stamps the command's correlation id on the outgoing context, then runs
/// the payload pipe if there is one.
struct CorrelatePipe<'a, C> {
    correlation_id: Uuid,
    inner: Option<&'a dyn Pipe<SendContext<C>>>,
}

impl<'a, C> CorrelatePipe<'a, C> {
    fn new(correlation_id: Uuid, inner: Option<&'a dyn Pipe<SendContext<C>>>) -> Self {
        Self {
            correlation_id,
            inner,
        }
    }
}

#[async_trait]
impl<'a, C: Send + Sync> Pipe<SendContext<C>> for CorrelatePipe<'a, C> {
    async fn send(&self, context: &SendContext<C>) -> Result<(), BusError> {
        context.set_correlation_id(self.correlation_id);
        match self.inner {
            Some(pipe) if !pipe.is_empty() => pipe.send(context).await,
            _ => Ok(()),
        }
    }
}

impl<C> Probe for CorrelatePipe<'_, C> {
    fn probe(&self, context: &mut ProbeContext) {
        if let Some(pipe) = self.inner {
            pipe.probe(context);
        }
    }
}

/// Runs a pipe written for the payload type over the command's context,
/// through a proxy that carries the payload.
struct PayloadContextPipe<T: ?Sized> {
    payload: Arc<T>,
    message_type: MessageType,
    pipe: Arc<dyn Pipe<SendContext<T>>>,
}

#[async_trait]
impl<T: ?Sized + Send + Sync> Pipe<SendContext<ScheduleRecurringMessage>> for PayloadContextPipe<T> {
    async fn send(&self, context: &SendContext<ScheduleRecurringMessage>) -> Result<(), BusError> {
        if self.pipe.is_empty() {
            return Ok(());
        }
        let proxy = context.proxy_as(Arc::clone(&self.payload), self.message_type);
        self.pipe.send(&proxy).await
    }

    fn is_empty(&self) -> bool {
        self.pipe.is_empty()
    }
}

impl<T: ?Sized> Probe for PayloadContextPipe<T> {
    fn probe(&self, context: &mut ProbeContext) {
        self.pipe.probe(context);
    }
}
