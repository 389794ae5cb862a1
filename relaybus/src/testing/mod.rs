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

//! An in-process transport for tests.
//!
//! [`InMemoryTransport`] records every published envelope and hands it to the
//! consumers connected for its message type, in connection order, before the
//! publish returns. Messages published by those consumers go through the
//! same transport.

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::common::BusError;
use crate::message::{ConsumeContext, PublishEndpoint, SendContext};
use crate::traits::{BusMessage, Consumer, MessageType, PublishTransport};

/// A consumer that failed while the transport delivered to it.
#[derive(Debug, Clone)]
pub struct ConsumerFault {
    pub message_id: Uuid,
    pub message_type: MessageType,
    pub error: Arc<BusError>,
}

#[async_trait]
trait ErasedConsumer: Send + Sync {
    async fn deliver(
        &self,
        context: &SendContext<dyn BusMessage>,
        endpoint: PublishEndpoint,
    ) -> Result<(), BusError>;
}

struct TypedConsumer<M> {
    consumer: Arc<dyn Consumer<M>>,
}

#[async_trait]
impl<M: BusMessage + Clone> ErasedConsumer for TypedConsumer<M> {
    async fn deliver(
        &self,
        context: &SendContext<dyn BusMessage>,
        endpoint: PublishEndpoint,
    ) -> Result<(), BusError> {
        match ConsumeContext::<M>::from_send(context, endpoint) {
            Some(consume) => self.consumer.consume(&consume).await,
            None => Ok(()),
        }
    }
}

/// Records published envelopes and delivers them to connected consumers.
///
/// Consumer failures do not fail the publish; they are kept and returned by
/// [`InMemoryTransport::faults`].
pub struct InMemoryTransport {
    this: Weak<InMemoryTransport>,
    consumers: DashMap<TypeId, Vec<Arc<dyn ErasedConsumer>>>,
    published: Mutex<Vec<SendContext<dyn BusMessage>>>,
    faults: Mutex<Vec<ConsumerFault>>,
}

impl fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("published", &self.published.lock().len())
            .field("faults", &self.faults.lock().len())
            .finish_non_exhaustive()
    }
}

impl InMemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            consumers: DashMap::new(),
            published: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
        })
    }

    /// Delivers every published `M` to `consumer`.
    pub fn connect<M: BusMessage + Clone>(&self, consumer: Arc<dyn Consumer<M>>) {
        self.consumers
            .entry(TypeId::of::<M>())
            .or_default()
            .push(Arc::new(TypedConsumer { consumer }));
    }

    /// An endpoint publishing through this transport.
    pub fn endpoint(&self) -> PublishEndpoint {
        match self.this.upgrade() {
            Some(this) => PublishEndpoint::new(this),
            None => unreachable!("the transport is only reachable through its Arc"),
        }
    }

    /// Every envelope published so far, in publish order.
    pub fn published(&self) -> Vec<SendContext<dyn BusMessage>> {
        self.published.lock().clone()
    }

    /// The published messages of type `T`, in publish order.
    pub fn published_of<T: BusMessage + Clone>(&self) -> Vec<T> {
        self.published
            .lock()
            .iter()
            .filter_map(|context| context.downcast_message::<T>().cloned())
            .collect()
    }

    pub fn faults(&self) -> Vec<ConsumerFault> {
        self.faults.lock().clone()
    }
}

#[async_trait]
impl PublishTransport for InMemoryTransport {
    async fn publish(&self, context: SendContext<dyn BusMessage>) -> Result<(), BusError> {
        self.published.lock().push(context.clone());
        let message_type = context.message_type();
        let consumers = self
            .consumers
            .get(&message_type.id())
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        trace!(%message_type, consumers = consumers.len(), "Delivering in memory");

        let Some(this) = self.this.upgrade() else {
            return Ok(());
        };
        let endpoint = PublishEndpoint::new(this);
        for consumer in consumers {
            if let Err(error) = consumer.deliver(&context, endpoint.clone()).await {
                warn!(%message_type, message_id = %context.message_id(), %error, "Consumer faulted");
                self.faults.lock().push(ConsumerFault {
                    message_id: context.message_id(),
                    message_type,
                    error: Arc::new(error),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[crate::bus_message]
    struct Ping {
        sequence: u32,
    }

    #[crate::bus_message]
    struct Pong {
        sequence: u32,
    }

    struct Responder;

    #[async_trait]
    impl Consumer<Ping> for Responder {
        async fn consume(&self, context: &ConsumeContext<Ping>) -> Result<(), BusError> {
            let sequence = context.message().sequence;
            context.publish(Pong { sequence }).await
        }
    }

    #[tokio::test]
    async fn consumers_publish_through_the_same_transport() -> anyhow::Result<()> {
        let transport = InMemoryTransport::new();
        transport.connect::<Ping>(Arc::new(Responder));

        transport.endpoint().publish(Ping { sequence: 7 }).await?;

        let published = transport.published();
        assert_eq!(published.len(), 2);
        assert_eq!(transport.published_of::<Pong>().len(), 1);
        assert_eq!(transport.published_of::<Pong>()[0].sequence, 7);
        assert_eq!(
            published[1].conversation_id(),
            Some(published[0].message_id())
        );
        assert!(transport.faults().is_empty());
        Ok(())
    }
}
