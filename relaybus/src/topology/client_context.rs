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
use std::future::Future;
use std::sync::Arc;

use acton_ern::Ern;
use tokio_util::sync::CancellationToken;

use crate::common::BusError;
use crate::message::PayloadCache;
use crate::topology::{
    BrokerClient, BrokerClientError, Queue, QueueInfo, QueueSubscription, Topic, TopicInfo,
};
use crate::traits::PipeContext;

/// A connection to the broker, scoped to its lifetime.
///
/// One-time setup on this context runs once per connection. Every broker
/// call observes the context's cancellation token.
pub struct ClientContext {
    id: Ern,
    scope: String,
    client: Arc<dyn BrokerClient>,
    payloads: PayloadCache,
    cancellation: CancellationToken,
}

impl Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("id", &self.scope)
            .field("client", &self.client)
            .field("payloads", &self.payloads)
            .finish()
    }
}

impl ClientContext {
    /// Creates a context for a connection named `name`.
    ///
    /// # Errors
    ///
    /// [`BusError::ArgumentInvalid`] if `name` is not a valid identifier root.
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn BrokerClient>,
        cancellation: CancellationToken,
    ) -> Result<Self, BusError> {
        let id = Ern::with_root(name.into())
            .map_err(|error| BusError::argument("name", error.to_string()))?;
        Ok(Self {
            scope: id.to_string(),
            id,
            client,
            payloads: PayloadCache::new(),
            cancellation,
        })
    }

    pub fn id(&self) -> &Ern {
        &self.id
    }

    pub fn client(&self) -> &Arc<dyn BrokerClient> {
        &self.client
    }

    pub async fn create_topic(&self, topic: &Topic) -> Result<TopicInfo, BrokerClientError> {
        self.cancellable(self.client.create_topic(topic)).await
    }

    pub async fn create_queue(&self, queue: &Queue) -> Result<QueueInfo, BrokerClientError> {
        self.cancellable(self.client.create_queue(queue)).await
    }

    pub async fn create_queue_subscription(
        &self,
        subscription: &QueueSubscription,
    ) -> Result<(), BrokerClientError> {
        self.cancellable(self.client.create_queue_subscription(subscription))
            .await
    }

    pub async fn delete_topic(&self, topic: &Topic) -> Result<(), BrokerClientError> {
        self.cancellable(self.client.delete_topic(topic)).await
    }

    pub async fn delete_queue(&self, queue: &Queue) -> Result<(), BrokerClientError> {
        self.cancellable(self.client.delete_queue(queue)).await
    }

    async fn cancellable<T>(
        &self,
        call: impl Future<Output = Result<T, BrokerClientError>>,
    ) -> Result<T, BrokerClientError> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(BrokerClientError::Cancelled),
            result = call => result,
        }
    }
}

impl PipeContext for ClientContext {
    fn payloads(&self) -> &PayloadCache {
        &self.payloads
    }

    fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    fn scope(&self) -> &str {
        &self.scope
    }
}
