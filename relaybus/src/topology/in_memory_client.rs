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

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::topology::{
    BrokerClient, BrokerClientError, Queue, QueueInfo, QueueSubscription, Topic, TopicInfo,
};

/// One completed call against an [`InMemoryBrokerClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    CreateTopic(String),
    CreateQueue(String),
    CreateQueueSubscription { topic: String, queue: String },
    DeleteTopic(String),
    DeleteQueue(String),
}

impl BrokerCall {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            BrokerCall::CreateTopic(_)
                | BrokerCall::CreateQueue(_)
                | BrokerCall::CreateQueueSubscription { .. }
        )
    }
}

/// A broker kept in memory.
///
/// Creates are idempotent and keep the first identifier. Every completed
/// call is journaled in completion order, and names registered with
/// [`InMemoryBrokerClient::fail_on`] fail to declare.
#[derive(Debug, Default)]
pub struct InMemoryBrokerClient {
    topics: DashMap<String, TopicInfo>,
    queues: DashMap<String, QueueInfo>,
    subscriptions: DashSet<QueueSubscription>,
    failing: DashSet<String>,
    calls: Mutex<Vec<BrokerCall>>,
    latency: Option<Duration>,
}

impl InMemoryBrokerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes declaring the entity called `name` fail.
    pub fn fail_on(&self, name: impl Into<String>) {
        self.failing.insert(name.into());
    }

    /// Journal of completed calls.
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.calls.lock().iter().filter(|call| call.is_create()).count()
    }

    pub fn topic(&self, name: &str) -> Option<TopicInfo> {
        self.topics.get(name).map(|entry| entry.value().clone())
    }

    pub fn queue(&self, name: &str) -> Option<QueueInfo> {
        self.queues.get(name).map(|entry| entry.value().clone())
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn has_subscription(&self, topic: &str, queue: &str) -> bool {
        self.subscriptions.contains(&QueueSubscription {
            topic: topic.to_string(),
            queue: queue.to_string(),
        })
    }

    async fn call(&self, name: &str) -> Result<(), BrokerClientError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(name) {
            return Err(BrokerClientError::Other(anyhow!("broker refused '{name}'")));
        }
        Ok(())
    }

    fn record(&self, call: BrokerCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl BrokerClient for InMemoryBrokerClient {
    async fn create_topic(&self, topic: &Topic) -> Result<TopicInfo, BrokerClientError> {
        self.call(&topic.name).await?;
        let info = self
            .topics
            .entry(topic.name.clone())
            .or_insert_with(|| {
                TopicInfo::new(topic.name.clone(), format!("topic:{}", Uuid::new_v4().simple()))
            })
            .clone();
        self.record(BrokerCall::CreateTopic(topic.name.clone()));
        Ok(info)
    }

    async fn create_queue(&self, queue: &Queue) -> Result<QueueInfo, BrokerClientError> {
        self.call(&queue.name).await?;
        let info = self
            .queues
            .entry(queue.name.clone())
            .or_insert_with(|| {
                QueueInfo::new(
                    queue.name.clone(),
                    format!("queue:{}", Uuid::new_v4().simple()),
                    format!("memory://queues/{}", queue.name),
                )
            })
            .clone();
        self.record(BrokerCall::CreateQueue(queue.name.clone()));
        Ok(info)
    }

    async fn create_queue_subscription(
        &self,
        subscription: &QueueSubscription,
    ) -> Result<(), BrokerClientError> {
        self.call(&subscription.queue).await?;
        if !self.topics.contains_key(&subscription.topic) {
            return Err(BrokerClientError::NotFound {
                entity: "topic",
                name: subscription.topic.clone(),
            });
        }
        if !self.queues.contains_key(&subscription.queue) {
            return Err(BrokerClientError::NotFound {
                entity: "queue",
                name: subscription.queue.clone(),
            });
        }
        self.subscriptions.insert(subscription.clone());
        self.record(BrokerCall::CreateQueueSubscription {
            topic: subscription.topic.clone(),
            queue: subscription.queue.clone(),
        });
        Ok(())
    }

    async fn delete_topic(&self, topic: &Topic) -> Result<(), BrokerClientError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.record(BrokerCall::DeleteTopic(topic.name.clone()));
        self.topics
            .remove(&topic.name)
            .map(|_| ())
            .ok_or_else(|| BrokerClientError::NotFound {
                entity: "topic",
                name: topic.name.clone(),
            })
    }

    async fn delete_queue(&self, queue: &Queue) -> Result<(), BrokerClientError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.record(BrokerCall::DeleteQueue(queue.name.clone()));
        self.subscriptions.retain(|subscription| subscription.queue != queue.name);
        self.queues
            .remove(&queue.name)
            .map(|_| ())
            .ok_or_else(|| BrokerClientError::NotFound {
                entity: "queue",
                name: queue.name.clone(),
            })
    }
}
