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

use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::common::BusError;
use crate::message::SendContext;
use crate::traits::{BusMessage, PublishTransport};

/// Buffers publishes issued while a message is being consumed.
///
/// Nothing reaches the wrapped transport until [`InMemoryOutbox::release`]
/// is called after the consume succeeded. [`InMemoryOutbox::discard`] drops
/// the buffer when the consume faulted.
pub struct InMemoryOutbox {
    transport: Arc<dyn PublishTransport>,
    pending: Mutex<Vec<SendContext<dyn BusMessage>>>,
}

impl std::fmt::Debug for InMemoryOutbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryOutbox")
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl InMemoryOutbox {
    pub fn new(transport: Arc<dyn PublishTransport>) -> Self {
        Self {
            transport,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Number of buffered messages.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Delivers every buffered message in publish order.
    ///
    /// # Errors
    ///
    /// Stops at the first transport failure; messages after it stay unsent.
    pub async fn release(&self) -> Result<usize, BusError> {
        let pending = mem::take(&mut *self.pending.lock());
        let count = pending.len();
        for context in pending {
            self.transport.publish(context).await?;
        }
        trace!(count, "Outbox released");
        Ok(count)
    }

    /// Drops every buffered message.
    pub fn discard(&self) -> usize {
        let discarded = mem::take(&mut *self.pending.lock()).len();
        if discarded > 0 {
            debug!(discarded, "Outbox discarded");
        }
        discarded
    }
}

#[async_trait]
impl PublishTransport for InMemoryOutbox {
    async fn publish(&self, context: SendContext<dyn BusMessage>) -> Result<(), BusError> {
        self.pending.lock().push(context);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PublishEndpoint;
    use crate::testing::InMemoryTransport;

    #[crate::bus_message]
    struct Shipped {
        order: u32,
    }

    #[tokio::test]
    async fn nothing_leaves_before_release() -> anyhow::Result<()> {
        let transport = InMemoryTransport::new();
        let outbox = Arc::new(InMemoryOutbox::new(transport.clone()));
        let endpoint = PublishEndpoint::new(outbox.clone());

        endpoint.publish(Shipped { order: 1 }).await?;
        endpoint.publish(Shipped { order: 2 }).await?;
        assert!(transport.published().is_empty());
        assert_eq!(outbox.pending(), 2);

        assert_eq!(outbox.release().await?, 2);
        let orders: Vec<u32> = transport
            .published_of::<Shipped>()
            .iter()
            .map(|shipped| shipped.order)
            .collect();
        assert_eq!(orders, vec![1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn discard_drops_the_buffer() -> anyhow::Result<()> {
        let transport = InMemoryTransport::new();
        let outbox = Arc::new(InMemoryOutbox::new(transport.clone()));
        PublishEndpoint::new(outbox.clone())
            .publish(Shipped { order: 3 })
            .await?;

        assert_eq!(outbox.discard(), 1);
        assert_eq!(outbox.release().await?, 0);
        assert!(transport.published().is_empty());
        Ok(())
    }
}
