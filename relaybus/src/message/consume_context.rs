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

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use static_assertions::assert_impl_all;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::common::BusError;
use crate::message::{PayloadCache, PublishEndpoint, SendContext};
use crate::traits::{BusMessage, MessageType, PipeContext, PublishTransport};

/// Envelope fields of a received message.
#[derive(Debug, Clone)]
pub struct EnvelopeMetadata {
    pub message_id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub source_address: Option<Url>,
    pub destination_address: Option<Url>,
    pub headers: BTreeMap<String, Value>,
    pub sent_time: DateTime<Utc>,
}

impl EnvelopeMetadata {
    /// Captures the envelope of an outgoing context as it would be received.
    pub fn from_send<M: ?Sized>(context: &SendContext<M>) -> Self {
        Self {
            message_id: context.message_id(),
            correlation_id: context.correlation_id(),
            conversation_id: context.conversation_id(),
            source_address: context.source_address(),
            destination_address: context.destination_address(),
            headers: context.headers(),
            sent_time: context.sent_time(),
        }
    }
}

/// An inbound message being consumed.
///
/// Publishes made through [`ConsumeContext::publish`] continue the consumed
/// message's conversation.
pub struct ConsumeContext<M: ?Sized> {
    message: Arc<M>,
    message_type: MessageType,
    envelope: Arc<EnvelopeMetadata>,
    publish_endpoint: PublishEndpoint,
    payloads: Arc<PayloadCache>,
    cancellation: CancellationToken,
    scope: Arc<str>,
}

assert_impl_all!(ConsumeContext<dyn BusMessage>: Send, Sync);

impl<M: ?Sized> Clone for ConsumeContext<M> {
    fn clone(&self) -> Self {
        Self {
            message: Arc::clone(&self.message),
            message_type: self.message_type,
            envelope: Arc::clone(&self.envelope),
            publish_endpoint: self.publish_endpoint.clone(),
            payloads: Arc::clone(&self.payloads),
            cancellation: self.cancellation.clone(),
            scope: Arc::clone(&self.scope),
        }
    }
}

impl<M: ?Sized> Debug for ConsumeContext<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumeContext")
            .field("message_type", &self.message_type)
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}

impl<M: BusMessage> ConsumeContext<M> {
    pub fn new(
        message: M,
        envelope: EnvelopeMetadata,
        publish_endpoint: PublishEndpoint,
        cancellation: CancellationToken,
    ) -> Self {
        let conversation_id = envelope.conversation_id.unwrap_or(envelope.message_id);
        let scope: Arc<str> = Arc::from(format!("consume:{}", envelope.message_id.simple()));
        Self {
            message: Arc::new(message),
            message_type: MessageType::of::<M>(),
            envelope: Arc::new(envelope),
            publish_endpoint: publish_endpoint
                .with_conversation_id(conversation_id)
                .with_cancellation(cancellation.clone()),
            payloads: Arc::new(PayloadCache::new()),
            cancellation,
            scope,
        }
    }

    /// Builds a consume context for a received erased context, if it carries an `M`.
    pub fn from_send(
        context: &SendContext<dyn BusMessage>,
        publish_endpoint: PublishEndpoint,
    ) -> Option<Self>
    where
        M: Clone,
    {
        let message = context.downcast_message::<M>()?.clone();
        Some(Self::new(
            message,
            EnvelopeMetadata::from_send(context),
            publish_endpoint,
            context.cancellation_token().child_token(),
        ))
    }
}

impl<M: ?Sized> ConsumeContext<M> {
    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn envelope(&self) -> &EnvelopeMetadata {
        &self.envelope
    }

    pub fn publish_endpoint(&self) -> &PublishEndpoint {
        &self.publish_endpoint
    }

    /// Returns a context for the same message whose publishes go through `transport`.
    #[must_use]
    pub fn with_publish_transport(&self, transport: Arc<dyn PublishTransport>) -> Self {
        Self {
            message: Arc::clone(&self.message),
            message_type: self.message_type,
            envelope: Arc::clone(&self.envelope),
            publish_endpoint: self.publish_endpoint.with_transport(transport),
            payloads: Arc::clone(&self.payloads),
            cancellation: self.cancellation.clone(),
            scope: Arc::clone(&self.scope),
        }
    }

    /// Publishes `message` in the conversation of the consumed message.
    pub async fn publish<T: BusMessage>(&self, message: T) -> Result<(), BusError> {
        self.publish_endpoint.publish(message).await
    }
}

impl<M: ?Sized + Send + Sync> PipeContext for ConsumeContext<M> {
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
