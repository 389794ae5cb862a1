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
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::common::{BusError, SagaConfig, TransitionRejection, CONFIG};
use crate::message::{ConsumeContext, InMemoryOutbox};
use crate::saga::activity::{ActivityChain, FaultTrace};
use crate::saga::event::EventDefinition;
use crate::saga::{
    BehaviorContext, Correlation, MissingInstancePolicy, Next, RepositoryError, SagaInstance,
    SagaRepository, StateMachine, FINAL, INITIAL,
};
use crate::traits::{BusMessage, Consumer, PipeContext, PublishTransport};

/// What one consume did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaOutcome {
    /// No instance changed: the event was ignored or discarded.
    Ignored,
    /// One record per instance the event moved, in correlation order.
    Transitioned(Vec<TransitionRecord>),
}

impl SagaOutcome {
    pub fn records(&self) -> &[TransitionRecord] {
        match self {
            SagaOutcome::Ignored => &[],
            SagaOutcome::Transitioned(records) => records,
        }
    }
}

/// A committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub correlation_id: Uuid,
    /// The instance was created by this event.
    pub created: bool,
    pub from: String,
    pub to: String,
    /// The instance reached `Final`.
    pub finalized: bool,
}

/// Drives the instances of one state machine from consumed events.
///
/// For each correlated instance the runtime takes the repository lock,
/// loads the instance, runs the activity chain of `(state, event)` against a
/// working copy and persists that copy only when the whole chain succeeded.
/// Messages published by activities are held in an [`InMemoryOutbox`] and
/// delivered after the instance is persisted, unless the outbox is disabled
/// in [`SagaConfig`].
pub struct SagaRuntime<I, R: ?Sized> {
    machine: Arc<StateMachine<I>>,
    repository: Arc<R>,
    config: SagaConfig,
}

impl<I, R: ?Sized> fmt::Debug for SagaRuntime<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaRuntime")
            .field("machine", &self.machine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<I, R> SagaRuntime<I, R>
where
    I: SagaInstance,
    R: SagaRepository<I> + ?Sized,
{
    /// Creates a runtime using the global saga configuration.
    pub fn new(machine: Arc<StateMachine<I>>, repository: Arc<R>) -> Self {
        Self::with_config(machine, repository, CONFIG.saga.clone())
    }

    pub fn with_config(machine: Arc<StateMachine<I>>, repository: Arc<R>, config: SagaConfig) -> Self {
        Self {
            machine,
            repository,
            config,
        }
    }

    pub fn machine(&self) -> &Arc<StateMachine<I>> {
        &self.machine
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Applies the consumed event to every instance it correlates with.
    ///
    /// Instances are processed one after another; the first error stops the
    /// consume. Transitions already committed for earlier instances stay
    /// committed.
    ///
    /// # Errors
    ///
    /// - [`BusError::ArgumentInvalid`] when the state machine declares no event for `M`
    /// - [`BusError::TransitionInvalid`] when the event is not accepted
    /// - [`BusError::TransitionFault`] when an activity failed
    /// - [`BusError::PersistenceFailure`] when the repository failed
    /// - [`BusError::Cancelled`] when the consume was cancelled
    /// - [`BusError::CollaboratorFailure`] naming `outbox` when buffered
    ///   publishes could not be delivered. The transition is already
    ///   persisted at that point.
    #[instrument(skip_all, fields(saga = %self.machine.name(), message_type = %context.message_type()))]
    pub async fn consume<M>(&self, context: &ConsumeContext<M>) -> Result<SagaOutcome, BusError>
    where
        M: BusMessage + Clone,
    {
        let Some(definition) = self.machine.event_definition::<M>() else {
            return Err(BusError::argument(
                "message",
                format!(
                    "saga '{}' declares no event for {}",
                    self.machine.name(),
                    context.message_type()
                ),
            ));
        };
        if context.cancellation_token().is_cancelled() {
            return Err(self.cancelled(&definition.name));
        }

        let correlation_ids = self.correlate(definition, context.message()).await?;
        let mut records = Vec::with_capacity(correlation_ids.len());
        for correlation_id in correlation_ids {
            if let Some(record) = self.transition(definition, correlation_id, context).await? {
                records.push(record);
            }
        }

        if records.is_empty() {
            Ok(SagaOutcome::Ignored)
        } else {
            Ok(SagaOutcome::Transitioned(records))
        }
    }

    async fn correlate<M>(
        &self,
        definition: &EventDefinition<I, M>,
        message: &M,
    ) -> Result<Vec<Uuid>, BusError>
    where
        M: BusMessage + Clone,
    {
        match &definition.correlation {
            Correlation::ById(key) => Ok(vec![(key.as_ref())(message)]),
            Correlation::ByQuery { filter, new_id } => {
                let matches = |instance: &I| (filter.as_ref())(instance, message);
                let ids = self
                    .repository
                    .query(&matches)
                    .await
                    .map_err(|source| self.persistence(Uuid::nil(), "query", source))?;
                if ids.is_empty() {
                    Ok(vec![(new_id.as_ref())(message)])
                } else {
                    debug!(event = %definition.name, instances = ids.len(), "Event correlated by query");
                    Ok(ids)
                }
            }
        }
    }

    async fn transition<M>(
        &self,
        definition: &EventDefinition<I, M>,
        correlation_id: Uuid,
        context: &ConsumeContext<M>,
    ) -> Result<Option<TransitionRecord>, BusError>
    where
        M: BusMessage + Clone,
    {
        let event = &definition.name;
        let guard = self
            .repository
            .lock(correlation_id)
            .await
            .map_err(|source| self.persistence(correlation_id, "lock", source))?;
        let stored = self
            .repository
            .load(correlation_id)
            .await
            .map_err(|source| self.persistence(correlation_id, "load", source))?;

        let (instance, created) = match stored {
            Some(instance) if instance.current_state() != FINAL => (instance, false),
            Some(_) => return self.missing_instance(definition, correlation_id, FINAL),
            None if self.machine.initiates(event) => {
                let mut instance = I::new(correlation_id);
                instance.set_current_state(INITIAL);
                (instance, true)
            }
            None => return self.missing_instance(definition, correlation_id, INITIAL),
        };

        let from = instance.current_state().to_string();
        if self.machine.is_ignored(&from, event) {
            debug!(%correlation_id, state = %from, event = %event, "Event ignored");
            return Ok(None);
        }
        let Some(chain) = self.machine.chain::<M>(&from, event) else {
            return Err(self.invalid(
                correlation_id,
                &from,
                event,
                TransitionRejection::UnhandledEvent,
            ));
        };

        let outbox = self
            .config
            .use_outbox
            .then(|| Arc::new(InMemoryOutbox::new(context.publish_endpoint().transport())));
        let consume = match &outbox {
            Some(outbox) => {
                context.with_publish_transport(Arc::clone(outbox) as Arc<dyn PublishTransport>)
            }
            None => context.clone(),
        };
        let discard = || {
            if let Some(outbox) = &outbox {
                outbox.discard();
            }
        };

        let mut behavior = BehaviorContext::new(instance, consume, Arc::clone(event));
        let trace = FaultTrace::default();
        let cancellation = context.cancellation_token();
        let executed = tokio::select! {
            biased;
            () = cancellation.cancelled() => None,
            result = Next::new(&chain.activities, &trace).run(&mut behavior) => Some(result),
        };

        let Some(result) = executed else {
            discard();
            return Err(self.cancelled(event));
        };
        if let Err(error) = result {
            self.compensate(chain, &trace, &mut behavior, &error).await;
            discard();
            let activity = trace
                .origin()
                .and_then(|index| chain.activities.get(index))
                .map_or("unknown", |activity| activity.name());
            warn!(%correlation_id, state = %from, event = %event, activity, %error, "Transition faulted");
            return Err(BusError::TransitionFault {
                saga: self.machine.name().to_string(),
                correlation_id,
                state: from,
                event: event.to_string(),
                activity: activity.to_string(),
                source: error.into(),
            });
        }
        if cancellation.is_cancelled() {
            discard();
            return Err(self.cancelled(event));
        }

        let instance = behavior.into_instance();
        let to = instance.current_state().to_string();
        let finalized = to == FINAL;
        let persisted = if finalized && self.machine.completed_when_finalized() {
            self.repository
                .delete(correlation_id)
                .await
                .map_err(|source| self.persistence(correlation_id, "delete", source))
        } else {
            self.repository
                .save(&instance)
                .await
                .map_err(|source| self.persistence(correlation_id, "save", source))
        };
        if let Err(error) = persisted {
            discard();
            warn!(%correlation_id, state = %from, event = %event, %error, "Transition not persisted");
            return Err(error);
        }
        drop(guard);

        if let Some(outbox) = &outbox {
            outbox.release().await.map_err(|error| {
                warn!(%correlation_id, event = %event, %error, "Outbox release failed after the transition was persisted");
                BusError::collaborator("outbox", format!("release after '{event}'"), error)
            })?;
        }
        info!(%correlation_id, event = %event, from = %from, to = %to, created, "Saga transitioned");
        Ok(Some(TransitionRecord {
            correlation_id,
            created,
            from,
            to,
            finalized,
        }))
    }

    async fn compensate<M>(
        &self,
        chain: &ActivityChain<I, M>,
        trace: &FaultTrace,
        behavior: &mut BehaviorContext<I, M>,
        error: &anyhow::Error,
    ) where
        M: BusMessage + Clone,
    {
        for index in trace.compensations() {
            let Some(activity) = chain.activities.get(index) else {
                continue;
            };
            debug!(activity = activity.name(), "Running fault handler");
            if let Err(handler_error) = activity.faulted(behavior, error).await {
                warn!(activity = activity.name(), error = %handler_error, "Fault handler failed");
            }
        }
    }

    fn missing_instance<M>(
        &self,
        definition: &EventDefinition<I, M>,
        correlation_id: Uuid,
        state: &str,
    ) -> Result<Option<TransitionRecord>, BusError> {
        let event = &definition.name;
        if self.machine.is_ignored(state, event) {
            debug!(%correlation_id, state, event = %event, "Event ignored");
            return Ok(None);
        }
        match definition
            .missing_instance
            .unwrap_or(self.config.missing_instance)
        {
            MissingInstancePolicy::Discard => {
                debug!(%correlation_id, state, event = %event, "No active instance, event discarded");
                Ok(None)
            }
            MissingInstancePolicy::Fail => Err(self.invalid(
                correlation_id,
                state,
                event,
                TransitionRejection::SagaNotFound,
            )),
        }
    }

    fn invalid(
        &self,
        correlation_id: Uuid,
        state: &str,
        event: &str,
        reason: TransitionRejection,
    ) -> BusError {
        warn!(%correlation_id, state, event, %reason, "Transition rejected");
        BusError::TransitionInvalid {
            saga: self.machine.name().to_string(),
            correlation_id,
            state: state.to_string(),
            event: event.to_string(),
            reason,
        }
    }

    fn persistence(
        &self,
        correlation_id: Uuid,
        operation: &'static str,
        source: RepositoryError,
    ) -> BusError {
        BusError::PersistenceFailure {
            saga: self.machine.name().to_string(),
            correlation_id,
            operation,
            source,
        }
    }

    fn cancelled(&self, event: &str) -> BusError {
        BusError::cancelled(format!("saga {} handling {event}", self.machine.name()))
    }
}

#[async_trait]
impl<I, R, M> Consumer<M> for SagaRuntime<I, R>
where
    I: SagaInstance,
    R: SagaRepository<I> + ?Sized,
    M: BusMessage + Clone,
{
    async fn consume(&self, context: &ConsumeContext<M>) -> Result<(), BusError> {
        SagaRuntime::consume(self, context).await.map(|_| ())
    }
}
