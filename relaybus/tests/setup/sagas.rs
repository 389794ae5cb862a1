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
#![allow(unused)]

use std::sync::Arc;

use relaybus::prelude::*;
use relaybus::saga::MissingInstancePolicy;

use crate::setup::messages::*;

#[saga_instance]
pub struct TestInstance {
    pub correlation_id: Uuid,
    pub current_state: String,
    pub key: String,
    pub touches: u32,
}

/// States and events of the test saga:
///
/// `Initial --Started--> Active --Updated--> Done --> Final`
pub struct TestSaga {
    pub active: State,
    pub done: State,
    pub started: Event<StartTest>,
    pub updated: Event<UpdateTest>,
    pub touched: Event<TouchByKey>,
}

impl Default for TestSaga {
    fn default() -> Self {
        Self {
            active: State::new("Active"),
            done: State::new("Done"),
            started: Event::new("Started"),
            updated: Event::new("Updated"),
            touched: Event::new("Touched"),
        }
    }
}

impl TestSaga {
    /// States and events, with no transition bound yet.
    pub fn declare(&self) -> StateMachineBuilder<TestInstance> {
        StateMachineBuilder::new("test-saga")
            .state(&self.active)
            .state(&self.done)
            .event(
                &self.started,
                Correlation::by_id(|message: &StartTest| message.correlation_id),
            )
            .event(
                &self.updated,
                Correlation::by_id(|message: &UpdateTest| message.test_id),
            )
            .event_with_policy(
                &self.touched,
                Correlation::by_query(
                    |instance: &TestInstance, message: &TouchByKey| instance.key == message.key,
                    |_: &TouchByKey| Uuid::new_v4(),
                ),
                MissingInstancePolicy::Discard,
            )
    }

    /// The full saga, bound on top of `builder`.
    pub fn bind(&self, builder: StateMachineBuilder<TestInstance>) -> StateMachineBuilder<TestInstance> {
        builder
            .initially(&self.started, |when| {
                when.then(|context| {
                    context.instance_mut().key = context.message().key.clone();
                })
                .publish(|context| TestStarted {
                    correlation_id: context.correlation_id(),
                    key: context.instance().key.clone(),
                })
                .transition_to(&self.active)
            })
            .during(&self.active, &self.updated, |when| {
                when.publish(|context| TestUpdated {
                    correlation_id: context.correlation_id(),
                })
                .transition_to(&self.done)
                .finalize()
            })
            .during(&self.active, &self.touched, |when| {
                when.then(|context| context.instance_mut().touches += 1)
            })
    }

    /// The saga deleting instances once they reach `Final`.
    pub fn machine(&self) -> anyhow::Result<Arc<StateMachine<TestInstance>>> {
        Ok(self
            .bind(self.declare())
            .set_completed_when_finalized()
            .build()?)
    }

    /// The saga keeping finalized instances in the store.
    pub fn keeping_finalized(&self) -> anyhow::Result<Arc<StateMachine<TestInstance>>> {
        Ok(self.bind(self.declare()).build()?)
    }
}
