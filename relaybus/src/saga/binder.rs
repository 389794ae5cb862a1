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

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::saga::{Activity, BehaviorContext, Event, Next, SagaInstance, State, FINAL};
use crate::traits::BusMessage;

/// Collects the activities run when `event` arrives in a given state.
///
/// Handed to the configuration closures of
/// [`StateMachineBuilder`](crate::saga::StateMachineBuilder):
///
/// ```ignore
/// .during(&active, &updated, |when| {
///     when.publish(|ctx| TestUpdated { correlation_id: ctx.correlation_id() })
///         .transition_to(&done)
///         .finalize()
/// })
/// ```
pub struct EventActivityBinder<I, M>
where
    I: SagaInstance,
    M: BusMessage + Clone,
{
    event: Event<M>,
    activities: Vec<Arc<dyn Activity<I, M>>>,
    targets: Vec<Arc<str>>,
}

impl<I, M> EventActivityBinder<I, M>
where
    I: SagaInstance,
    M: BusMessage + Clone,
{
    pub(crate) fn new(event: &Event<M>) -> Self {
        Self {
            event: event.clone(),
            activities: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn event(&self) -> &Event<M> {
        &self.event
    }

    /// Runs `action` against the working instance.
    #[must_use]
    pub fn then<F>(self, action: F) -> Self
    where
        F: Fn(&mut BehaviorContext<I, M>) + Send + Sync + 'static,
    {
        self.activity(ThenActivity {
            action: move |context: &mut BehaviorContext<I, M>| -> anyhow::Result<()> {
                action(context);
                Ok(())
            },
        })
    }

    /// Runs a fallible `action`; an error faults the transition.
    #[must_use]
    pub fn try_then<F>(self, action: F) -> Self
    where
        F: Fn(&mut BehaviorContext<I, M>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.activity(ThenActivity { action })
    }

    /// Adds a custom activity.
    #[must_use]
    pub fn activity(mut self, activity: impl Activity<I, M> + 'static) -> Self {
        self.activities.push(Arc::new(activity));
        self
    }

    /// Publishes the message built by `build`.
    #[must_use]
    pub fn publish<T, F>(self, build: F) -> Self
    where
        T: BusMessage,
        F: Fn(&BehaviorContext<I, M>) -> T + Send + Sync + 'static,
    {
        self.activity(PublishActivity {
            build,
            message: PhantomData,
        })
    }

    /// Moves the instance to `state`.
    #[must_use]
    pub fn transition_to(mut self, state: &State) -> Self {
        self.targets.push(state.shared_name());
        self.activity(TransitionActivity {
            state: state.shared_name(),
        })
    }

    /// Moves the instance to the terminal state.
    #[must_use]
    pub fn finalize(self) -> Self {
        self.transition_to(&State::final_state())
    }

    pub(crate) fn into_parts(self) -> (Vec<Arc<dyn Activity<I, M>>>, Vec<Arc<str>>) {
        (self.activities, self.targets)
    }
}

struct ThenActivity<F> {
    action: F,
}

#[async_trait]
impl<I, M, F> Activity<I, M> for ThenActivity<F>
where
    I: SagaInstance,
    M: BusMessage + Clone,
    F: Fn(&mut BehaviorContext<I, M>) -> anyhow::Result<()> + Send + Sync,
{
    async fn execute(
        &self,
        context: &mut BehaviorContext<I, M>,
        next: Next<'_, I, M>,
    ) -> anyhow::Result<()> {
        (self.action)(context)?;
        next.run(context).await
    }

    fn name(&self) -> &'static str {
        "then"
    }
}

struct PublishActivity<T, F> {
    build: F,
    message: PhantomData<fn() -> T>,
}

#[async_trait]
impl<I, M, T, F> Activity<I, M> for PublishActivity<T, F>
where
    I: SagaInstance,
    M: BusMessage + Clone,
    T: BusMessage,
    F: Fn(&BehaviorContext<I, M>) -> T + Send + Sync,
{
    async fn execute(
        &self,
        context: &mut BehaviorContext<I, M>,
        next: Next<'_, I, M>,
    ) -> anyhow::Result<()> {
        let message = (self.build)(context);
        context.publish(message).await?;
        next.run(context).await
    }

    fn name(&self) -> &'static str {
        "publish"
    }
}

struct TransitionActivity {
    state: Arc<str>,
}

#[async_trait]
impl<I, M> Activity<I, M> for TransitionActivity
where
    I: SagaInstance,
    M: BusMessage + Clone,
{
    async fn execute(
        &self,
        context: &mut BehaviorContext<I, M>,
        next: Next<'_, I, M>,
    ) -> anyhow::Result<()> {
        context.instance_mut().set_current_state(&self.state);
        next.run(context).await
    }

    fn name(&self) -> &'static str {
        if &*self.state == FINAL {
            "finalize"
        } else {
            "transition"
        }
    }
}
