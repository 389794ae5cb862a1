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

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use crate::common::BusError;
use crate::message::{DispatchMode, SendContext};
use crate::pipeline::EmptyPipe;
use crate::traits::{BusMessage, Pipe, PublishTransport};

/// Publishes messages through a [`PublishTransport`].
///
/// Every published context gets the endpoint's source address and
/// conversation id before the caller's pipe runs, so the pipe can still
/// override them. Cloning is cheap.
#[derive(Clone)]
pub struct PublishEndpoint {
    transport: Arc<dyn PublishTransport>,
    source_address: Option<Url>,
    conversation_id: Option<Uuid>,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for PublishEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishEndpoint")
            .field("source_address", &self.source_address)
            .field("conversation_id", &self.conversation_id)
            .finish_non_exhaustive()
    }
}

impl PublishEndpoint {
    pub fn new(transport: Arc<dyn PublishTransport>) -> Self {
        Self {
            transport,
            source_address: None,
            conversation_id: None,
            cancellation: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_source_address(mut self, address: Url) -> Self {
        self.source_address = Some(address);
        self
    }

    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    /// Publishes with a token derived from `cancellation`.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Returns an endpoint identical to this one but delivering through `transport`.
    #[must_use]
    pub fn with_transport(&self, transport: Arc<dyn PublishTransport>) -> Self {
        Self {
            transport,
            ..self.clone()
        }
    }

    pub fn transport(&self) -> Arc<dyn PublishTransport> {
        Arc::clone(&self.transport)
    }

    pub fn source_address(&self) -> Option<&Url> {
        self.source_address.as_ref()
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        self.conversation_id
    }

    /// Publishes `message`.
    pub async fn publish<M: BusMessage>(&self, message: M) -> Result<(), BusError> {
        self.publish_with(message, &EmptyPipe).await
    }

    /// Publishes `message`, running `pipe` over the outgoing context first.
    ///
    /// # Errors
    ///
    /// Returns the pipe's error, [`BusError::Cancelled`] if the endpoint was
    /// cancelled, or the transport's error.
    #[instrument(skip_all, fields(message_type = std::any::type_name::<M>()))]
    pub async fn publish_with<M: BusMessage>(
        &self,
        message: M,
        pipe: &dyn Pipe<SendContext<M>>,
    ) -> Result<(), BusError> {
        let context = SendContext::new(message, DispatchMode::Publish, self.cancellation.child_token());
        self.prepare(&context);
        if !pipe.is_empty() {
            pipe.send(&context).await?;
        }
        self.dispatch(context.into_erased()).await
    }

    /// Publishes a message whose type is known only at runtime.
    #[instrument(skip_all, fields(message_type = (*message).message_type().name()))]
    pub async fn publish_dyn(
        &self,
        message: Arc<dyn BusMessage>,
        pipe: Option<&dyn Pipe<SendContext<dyn BusMessage>>>,
    ) -> Result<(), BusError> {
        let context =
            SendContext::from_dyn(message, DispatchMode::Publish, self.cancellation.child_token());
        self.prepare(&context);
        if let Some(pipe) = pipe.filter(|pipe| !pipe.is_empty()) {
            pipe.send(&context).await?;
        }
        self.dispatch(context).await
    }

    fn prepare<M: ?Sized>(&self, context: &SendContext<M>) {
        if let Some(address) = &self.source_address {
            context.set_source_address(address.clone());
        }
        if let Some(conversation_id) = self.conversation_id {
            context.set_conversation_id(conversation_id);
        }
    }

    async fn dispatch(&self, context: SendContext<dyn BusMessage>) -> Result<(), BusError> {
        if self.cancellation.is_cancelled() {
            return Err(BusError::cancelled(format!(
                "publish {}",
                context.message_type().short_name()
            )));
        }
        debug!(
            message_id = %context.message_id(),
            message_type = %context.message_type(),
            "Publishing"
        );
        self.transport.publish(context).await
    }
}
