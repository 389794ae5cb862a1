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
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::common::{BusError, TopologyConfig, CONFIG};
use crate::pipeline::ProbeContext;
use crate::topology::{
    BrokerClientError, BrokerTopology, ClientContext, EntitySettings, Queue, QueueInfo,
    QueueSubscription, Topic, TopicInfo,
};
use crate::traits::{Filter, Pipe, PipeContext, Probe};

/// Payload marking that the topology for settings `S` was declared on a
/// client context. Holds what the broker answered.
#[derive(Debug)]
pub struct ConfigureTopologyContext<S> {
    settings: Arc<S>,
    topics: Mutex<Vec<TopicInfo>>,
    queues: Mutex<Vec<QueueInfo>>,
}

impl<S> ConfigureTopologyContext<S> {
    fn new(settings: Arc<S>) -> Self {
        Self {
            settings,
            topics: Mutex::new(Vec::new()),
            queues: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn topics(&self) -> Vec<TopicInfo> {
        self.topics.lock().clone()
    }

    pub fn queues(&self) -> Vec<QueueInfo> {
        self.queues.lock().clone()
    }
}

/// Declares a [`BrokerTopology`] the first time a client context passes through.
///
/// Topics, then queues, then subscriptions are declared; each tier is
/// declared concurrently and fully joined before the next starts. A failed
/// declaration fails the whole setup, and the failure is cached on the
/// context. For receive settings, auto-delete topics and queues are removed
/// once the rest of the chain has completed.
#[derive(Debug)]
pub struct ConfigureTopologyFilter<S> {
    settings: Arc<S>,
    topology: Arc<BrokerTopology>,
    delete_auto_delete: bool,
}

impl<S: EntitySettings + Clone> ConfigureTopologyFilter<S> {
    /// Creates the filter using the global topology configuration.
    pub fn new(settings: S, topology: Arc<BrokerTopology>) -> Self {
        Self::with_config(settings, topology, &CONFIG.topology)
    }

    pub fn with_config(settings: S, topology: Arc<BrokerTopology>, config: &TopologyConfig) -> Self {
        Self {
            settings: Arc::new(settings),
            topology,
            delete_auto_delete: config.delete_auto_delete_on_shutdown,
        }
    }

    #[instrument(skip_all, fields(scope = context.scope(), entity = self.settings.entity_name()))]
    async fn configure_topology(
        &self,
        context: &ClientContext,
        payload: Arc<ConfigureTopologyContext<S>>,
    ) -> Result<(), BusError> {
        let topics = join_all(
            self.topology
                .topics()
                .iter()
                .map(|topic| self.declare_topic(context, topic)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        let queues = join_all(
            self.topology
                .queues()
                .iter()
                .map(|queue| self.declare_queue(context, queue)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        join_all(
            self.topology
                .subscriptions()
                .iter()
                .map(|subscription| self.declare_subscription(context, subscription)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        *payload.topics.lock() = topics;
        *payload.queues.lock() = queues;
        context.payloads().try_add((*self.settings).clone());
        Ok(())
    }

    async fn declare_topic(&self, context: &ClientContext, topic: &Topic) -> Result<TopicInfo, BusError> {
        let info = context
            .create_topic(topic)
            .await
            .map_err(|error| declare_failure(format!("create topic {}", topic.name), error))?;
        debug!(topic = %info.name, id = %info.id, "Created topic");
        Ok(info)
    }

    async fn declare_queue(&self, context: &ClientContext, queue: &Queue) -> Result<QueueInfo, BusError> {
        let info = context
            .create_queue(queue)
            .await
            .map_err(|error| declare_failure(format!("create queue {}", queue.name), error))?;
        debug!(queue = %info.name, id = %info.id, url = %info.url, "Created queue");
        Ok(info)
    }

    async fn declare_subscription(
        &self,
        context: &ClientContext,
        subscription: &QueueSubscription,
    ) -> Result<(), BusError> {
        debug!(topic = %subscription.topic, queue = %subscription.queue, "Binding topic to queue");
        context
            .create_queue_subscription(subscription)
            .await
            .map_err(|error| {
                declare_failure(
                    format!("subscribe {} to {}", subscription.queue, subscription.topic),
                    error,
                )
            })
    }

    #[instrument(skip_all, fields(scope = context.scope()))]
    async fn delete_auto_delete(&self, context: &ClientContext) -> Result<(), BusError> {
        let topics = self
            .topology
            .topics()
            .iter()
            .filter(|topic| topic.auto_delete)
            .map(|topic| async move {
                debug!(topic = %topic.name, "Delete topic");
                swallow_missing(context.delete_topic(topic).await)
                    .map_err(|error| declare_failure(format!("delete topic {}", topic.name), error))
            });
        let queues = self
            .topology
            .queues()
            .iter()
            .filter(|queue| queue.auto_delete)
            .map(|queue| async move {
                debug!(queue = %queue.name, "Delete queue");
                swallow_missing(context.delete_queue(queue).await)
                    .map_err(|error| declare_failure(format!("delete queue {}", queue.name), error))
            });

        let (topics, queues) = futures::join!(join_all(topics), join_all(queues));
        topics.into_iter().chain(queues).collect()
    }
}

/// Teardown tolerates entities that are already gone.
fn swallow_missing(result: Result<(), BrokerClientError>) -> Result<(), BrokerClientError> {
    match result {
        Err(BrokerClientError::NotFound { entity, name }) => {
            debug!(entity, name = %name, "Already deleted");
            Ok(())
        }
        Err(BrokerClientError::AlreadyExists { entity, name }) => {
            debug!(entity, name = %name, "Delete raced with a create, ignored");
            Ok(())
        }
        other => other,
    }
}

fn declare_failure(operation: String, error: BrokerClientError) -> BusError {
    match error {
        BrokerClientError::Cancelled => BusError::cancelled(operation),
        error => BusError::collaborator("broker client", operation, error),
    }
}

#[async_trait]
impl<S: EntitySettings + Clone> Filter<ClientContext> for ConfigureTopologyFilter<S> {
    async fn send(&self, context: &ClientContext, next: &dyn Pipe<ClientContext>) -> Result<(), BusError> {
        let settings = Arc::clone(&self.settings);
        context
            .one_time_setup(
                |payload| self.configure_topology(context, payload),
                move || ConfigureTopologyContext::new(settings),
            )
            .await?;

        next.send(context).await?;

        if self.settings.is_receive() && self.delete_auto_delete {
            self.delete_auto_delete(context).await?;
        }
        Ok(())
    }
}

impl<S> Probe for ConfigureTopologyFilter<S> {
    fn probe(&self, context: &mut ProbeContext) {
        let scope = context.create_filter_scope("configureTopology");
        self.topology.probe(scope);
    }
}
