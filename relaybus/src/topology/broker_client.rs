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

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use derive_new::new;
use tracing::{trace, warn};

use crate::topology::{Queue, QueueSubscription, Topic};

/// A declared topic as the broker knows it.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    /// Remote identifier assigned by the broker.
    pub id: String,
}

/// A declared queue as the broker knows it.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    /// Remote identifier assigned by the broker.
    pub id: String,
    /// Address messages are received from.
    pub url: String,
}

/// Errors a broker client reports.
#[derive(Debug, thiserror::Error)]
pub enum BrokerClientError {
    #[error("{entity} '{name}' was not found")]
    NotFound { entity: &'static str, name: String },
    #[error("{entity} '{name}' already exists")]
    AlreadyExists { entity: &'static str, name: String },
    #[error("broker call was cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Broker operations the topology protocol relies on.
///
/// Creates must be idempotent: creating an entity that exists returns the
/// existing entity's identity.
#[async_trait]
pub trait BrokerClient: Send + Sync + Debug {
    async fn create_topic(&self, topic: &Topic) -> Result<TopicInfo, BrokerClientError>;

    async fn create_queue(&self, queue: &Queue) -> Result<QueueInfo, BrokerClientError>;

    async fn create_queue_subscription(
        &self,
        subscription: &QueueSubscription,
    ) -> Result<(), BrokerClientError>;

    async fn delete_topic(&self, topic: &Topic) -> Result<(), BrokerClientError>;

    async fn delete_queue(&self, queue: &Queue) -> Result<(), BrokerClientError>;
}

/// Declares topics and queues twice and keeps the second answer.
///
/// Some brokers only report the remote identifier reliably on a repeated
/// create. Wrap the client of such a binding in this decorator; every other
/// client should declare once.
#[derive(Debug, Clone)]
pub struct ConfirmingBrokerClient<C> {
    inner: Arc<C>,
}

impl<C: BrokerClient> ConfirmingBrokerClient<C> {
    pub fn new(inner: Arc<C>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: BrokerClient> BrokerClient for ConfirmingBrokerClient<C> {
    async fn create_topic(&self, topic: &Topic) -> Result<TopicInfo, BrokerClientError> {
        let first = self.inner.create_topic(topic).await?;
        let confirmed = self.inner.create_topic(topic).await?;
        if first.id != confirmed.id {
            warn!(topic = %topic.name, first = %first.id, confirmed = %confirmed.id, "Topic identifier changed on confirmation");
        }
        trace!(topic = %confirmed.name, id = %confirmed.id, "Topic confirmed");
        Ok(confirmed)
    }

    async fn create_queue(&self, queue: &Queue) -> Result<QueueInfo, BrokerClientError> {
        let first = self.inner.create_queue(queue).await?;
        let confirmed = self.inner.create_queue(queue).await?;
        if first.id != confirmed.id {
            warn!(queue = %queue.name, first = %first.id, confirmed = %confirmed.id, "Queue identifier changed on confirmation");
        }
        trace!(queue = %confirmed.name, id = %confirmed.id, "Queue confirmed");
        Ok(confirmed)
    }

    async fn create_queue_subscription(
        &self,
        subscription: &QueueSubscription,
    ) -> Result<(), BrokerClientError> {
        self.inner.create_queue_subscription(subscription).await
    }

    async fn delete_topic(&self, topic: &Topic) -> Result<(), BrokerClientError> {
        self.inner.delete_topic(topic).await
    }

    async fn delete_queue(&self, queue: &Queue) -> Result<(), BrokerClientError> {
        self.inner.delete_queue(queue).await
    }
}
