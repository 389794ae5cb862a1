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

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::common::{ActivityFuture, BusError};
use crate::message::ConsumeContext;
use crate::saga::SagaInstance;
use crate::traits::BusMessage;

/// One step of a transition.
///
/// `execute` does its work and then continues with `next.run(context)`, or
/// returns without calling it to end the chain. When a later step fails,
/// `faulted` runs for every step that executed before the failing one, most
/// recent first, with the working copy of the instance and the error.
/// Nothing is undone automatically.
#[async_trait]
pub trait Activity<I, M>: Send + Sync
where
    I: SagaInstance,
    M: BusMessage + Clone,
{
    async fn execute(
        &self,
        context: &mut BehaviorContext<I, M>,
        next: Next<'_, I, M>,
    ) -> anyhow::Result<()>;

    /// Observes a fault raised further down the chain.
    async fn faulted(
        &self,
        context: &mut BehaviorContext<I, M>,
        error: &anyhow::Error,
    ) -> anyhow::Result<()> {
        let _ = (context, error);
        Ok(())
    }

    /// Name used in diagnostics and in `TransitionFault`.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// What activities see while a transition runs: a working copy of the
/// instance and the consumed event.
///
/// The working copy is persisted only after the whole chain succeeded.
pub struct BehaviorContext<I, M> {
    instance: I,
    consume: ConsumeContext<M>,
    event: Arc<str>,
}

impl<I: Debug, M> Debug for BehaviorContext<I, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorContext")
            .field("event", &self.event)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl<I, M> BehaviorContext<I, M>
where
    I: SagaInstance,
    M: BusMessage + Clone,
{
    pub(crate) fn new(instance: I, consume: ConsumeContext<M>, event: Arc<str>) -> Self {
        Self {
            instance,
            consume,
            event,
        }
    }

    pub fn instance(&self) -> &I {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut I {
        &mut self.instance
    }

    pub fn correlation_id(&self) -> Uuid {
        self.instance.correlation_id()
    }

    pub fn message(&self) -> &M {
        self.consume.message()
    }

    pub fn consume_context(&self) -> &ConsumeContext<M> {
        &self.consume
    }

    pub fn event_name(&self) -> &str {
        &self.event
    }

    /// Publishes `message` from the saga. Buffered until the transition is
    /// persisted when the outbox is enabled.
    pub async fn publish<T: BusMessage>(&self, message: T) -> Result<(), BusError> {
        self.consume.publish(message).await
    }

    pub(crate) fn into_instance(self) -> I {
        self.instance
    }
}

/// The activities of one `(state, event)` transition, in execution order.
pub(crate) struct ActivityChain<I, M>
where
    I: SagaInstance,
    M: BusMessage + Clone,
{
    pub(crate) activities: Vec<Arc<dyn Activity<I, M>>>,
}

impl<I, M> ActivityChain<I, M>
where
    I: SagaInstance,
    M: BusMessage + Clone,
{
    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.activities.iter().map(|activity| activity.name()).collect()
    }
}

/// Records which activities ran and which one raised.
#[derive(Debug, Default)]
pub(crate) struct FaultTrace {
    state: Mutex<TraceState>,
}

#[derive(Debug, Default)]
struct TraceState {
    invoked: Vec<usize>,
    origin: Option<usize>,
}

impl FaultTrace {
    fn invoked(&self, index: usize) {
        self.state.lock().invoked.push(index);
    }

    /// The innermost failure wins; outer activities re-raising it do not
    /// move the origin.
    fn failed(&self, index: usize) {
        let mut state = self.state.lock();
        if state.origin.is_none() {
            state.origin = Some(index);
        }
    }

    /// An activity absorbed whatever failed below it.
    fn recovered(&self) {
        self.state.lock().origin = None;
    }

    pub(crate) fn origin(&self) -> Option<usize> {
        self.state.lock().origin
    }

    /// Activities whose fault handler must run, most recently invoked first.
    pub(crate) fn compensations(&self) -> Vec<usize> {
        let state = self.state.lock();
        let Some(origin) = state.origin else {
            return Vec::new();
        };
        state
            .invoked
            .iter()
            .rev()
            .copied()
            .filter(|index| *index < origin)
            .collect()
    }
}

/// The rest of an activity chain.
pub struct Next<'a, I, M>
where
    I: SagaInstance,
    M: BusMessage + Clone,
{
    activities: &'a [Arc<dyn Activity<I, M>>],
    index: usize,
    trace: &'a FaultTrace,
}

impl<'a, I, M> Next<'a, I, M>
where
    I: SagaInstance,
    M: BusMessage + Clone,
{
    pub(crate) fn new(activities: &'a [Arc<dyn Activity<I, M>>], trace: &'a FaultTrace) -> Self {
        Self {
            activities,
            index: 0,
            trace,
        }
    }

    /// `true` when no activity is left.
    pub fn is_empty(&self) -> bool {
        self.index >= self.activities.len()
    }

    /// Runs the remaining activities.
    pub fn run<'c>(self, context: &'c mut BehaviorContext<I, M>) -> ActivityFuture<'c>
    where
        'a: 'c,
    {
        Box::pin(async move {
            let Some(activity) = self.activities.get(self.index) else {
                return Ok(());
            };
            self.trace.invoked(self.index);
            let next = Next {
                activities: self.activities,
                index: self.index + 1,
                trace: self.trace,
            };
            match activity.execute(context, next).await {
                Ok(()) => {
                    self.trace.recovered();
                    Ok(())
                }
                Err(error) => {
                    self.trace.failed(self.index);
                    Err(error)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compensations_skip_the_origin_and_later_steps() {
        let trace = FaultTrace::default();
        for index in 0..3 {
            trace.invoked(index);
        }
        trace.failed(2);
        trace.failed(1);

        assert_eq!(trace.origin(), Some(2));
        assert_eq!(trace.compensations(), vec![1, 0]);
    }

    #[test]
    fn recovery_clears_the_origin() {
        let trace = FaultTrace::default();
        trace.invoked(0);
        trace.invoked(1);
        trace.failed(1);
        trace.recovered();

        assert_eq!(trace.origin(), None);
        assert!(trace.compensations().is_empty());
    }
}
