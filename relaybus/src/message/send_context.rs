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
use parking_lot::RwLock;
use serde_json::Value;
use static_assertions::assert_impl_all;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::message::PayloadCache;
use crate::traits::{BusMessage, MessageType, PipeContext};

/// Whether a context addresses a single endpoint or every subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Point-to-point delivery to `destination_address`.
    Send,
    /// Fan-out to every subscriber of the message type.
    Publish,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Send => f.write_str("send"),
            DispatchMode::Publish => f.write_str("publish"),
        }
    }
}

/// Envelope state shared between a context and its proxies.
struct ContextInner {
    message_id: Uuid,
    scope: String,
    mode: DispatchMode,
    sent_time: DateTime<Utc>,
    correlation_id: RwLock<Option<Uuid>>,
    conversation_id: RwLock<Option<Uuid>>,
    source_address: RwLock<Option<Url>>,
    destination_address: RwLock<Option<Url>>,
    headers: RwLock<BTreeMap<String, Value>>,
    payloads: PayloadCache,
    cancellation: CancellationToken,
}

/// An outgoing message together with its envelope.
///
/// Cloning is cheap and yields a handle to the same envelope. A proxy made
/// with [`SendContext::proxy`] carries a different message but shares every
/// envelope field, so header changes made through the proxy land on the
/// message actually sent.
pub struct SendContext<M: ?Sized> {
    inner: Arc<ContextInner>,
    message: Arc<M>,
    message_type: MessageType,
}

// Contexts cross await points inside filters spawned on any worker.
assert_impl_all!(SendContext<dyn BusMessage>: Send, Sync, Clone);

impl<M: ?Sized> Clone for SendContext<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            message: Arc::clone(&self.message),
            message_type: self.message_type,
        }
    }
}

impl<M: ?Sized> Debug for SendContext<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendContext")
            .field("message_type", &self.message_type)
            .field("message_id", &self.inner.message_id)
            .field("mode", &self.inner.mode)
            .field("correlation_id", &*self.inner.correlation_id.read())
            .field("destination_address", &*self.inner.destination_address.read())
            .finish_non_exhaustive()
    }
}

impl<M: BusMessage> SendContext<M> {
    /// Creates a context for `message`.
    pub fn new(message: M, mode: DispatchMode, cancellation: CancellationToken) -> Self {
        Self::with_message(Arc::new(message), MessageType::of::<M>(), mode, cancellation)
    }

    /// Erases the message type so the context can be handed to a transport.
    #[must_use]
    pub fn into_erased(self) -> SendContext<dyn BusMessage> {
        SendContext {
            inner: self.inner,
            message: self.message,
            message_type: self.message_type,
        }
    }
}

impl SendContext<dyn BusMessage> {
    /// Creates a context for a message whose type is known only at runtime.
    pub fn from_dyn(
        message: Arc<dyn BusMessage>,
        mode: DispatchMode,
        cancellation: CancellationToken,
    ) -> Self {
        let message_type = (*message).message_type();
        Self::with_message(message, message_type, mode, cancellation)
    }

    /// Returns the message as `T` if that is its concrete type.
    #[must_use]
    pub fn downcast_message<T: BusMessage>(&self) -> Option<&T> {
        (*self.message).as_any().downcast_ref::<T>()
    }
}

impl<M: ?Sized> SendContext<M> {
    fn with_message(
        message: Arc<M>,
        message_type: MessageType,
        mode: DispatchMode,
        cancellation: CancellationToken,
    ) -> Self {
        let message_id = Uuid::new_v4();
        Self {
            inner: Arc::new(ContextInner {
                message_id,
                scope: format!("{mode}:{}", message_id.simple()),
                mode,
                sent_time: Utc::now(),
                correlation_id: RwLock::new(None),
                conversation_id: RwLock::new(None),
                source_address: RwLock::new(None),
                destination_address: RwLock::new(None),
                headers: RwLock::new(BTreeMap::new()),
                payloads: PayloadCache::new(),
                cancellation,
            }),
            message,
            message_type,
        }
    }

    /// Creates a context for `message` sharing this context's envelope.
    #[must_use]
    pub fn proxy<T: BusMessage>(&self, message: Arc<T>) -> SendContext<T> {
        self.proxy_as(message, MessageType::of::<T>())
    }

    /// Creates a proxy for a message that may be unsized, with its type given
    /// explicitly.
    #[must_use]
    pub fn proxy_as<T: ?Sized>(&self, message: Arc<T>, message_type: MessageType) -> SendContext<T> {
        SendContext {
            inner: Arc::clone(&self.inner),
            message,
            message_type,
        }
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn message_arc(&self) -> Arc<M> {
        Arc::clone(&self.message)
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn message_id(&self) -> Uuid {
        self.inner.message_id
    }

    pub fn mode(&self) -> DispatchMode {
        self.inner.mode
    }

    pub fn sent_time(&self) -> DateTime<Utc> {
        self.inner.sent_time
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        *self.inner.correlation_id.read()
    }

    pub fn set_correlation_id(&self, correlation_id: Uuid) {
        *self.inner.correlation_id.write() = Some(correlation_id);
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        *self.inner.conversation_id.read()
    }

    pub fn set_conversation_id(&self, conversation_id: Uuid) {
        *self.inner.conversation_id.write() = Some(conversation_id);
    }

    pub fn source_address(&self) -> Option<Url> {
        self.inner.source_address.read().clone()
    }

    pub fn set_source_address(&self, address: Url) {
        *self.inner.source_address.write() = Some(address);
    }

    pub fn destination_address(&self) -> Option<Url> {
        self.inner.destination_address.read().clone()
    }

    pub fn set_destination_address(&self, address: Url) {
        *self.inner.destination_address.write() = Some(address);
    }

    /// Sets a header, replacing any previous value under `key`.
    pub fn set_header(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.headers.write().insert(key.into(), value.into());
    }

    pub fn header(&self, key: &str) -> Option<Value> {
        self.inner.headers.read().get(key).cloned()
    }

    /// Snapshot of every header.
    pub fn headers(&self) -> BTreeMap<String, Value> {
        self.inner.headers.read().clone()
    }
}

impl<M: ?Sized + Send + Sync> PipeContext for SendContext<M> {
    fn payloads(&self) -> &PayloadCache {
        &self.inner.payloads
    }

    fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    fn scope(&self) -> &str {
        &self.inner.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Envelope(String);

    #[test]
    fn proxy_shares_envelope_fields() {
        let context = SendContext::new(Ping(1), DispatchMode::Publish, CancellationToken::new());
        let proxy = context.proxy(Arc::new(Envelope("wrapped".to_string())));

        proxy.set_header("tenant", "acme");
        proxy.set_correlation_id(Uuid::nil());

        assert_eq!(context.header("tenant"), Some(Value::from("acme")));
        assert_eq!(context.correlation_id(), Some(Uuid::nil()));
        assert_eq!(proxy.message_id(), context.message_id());
        assert_eq!(proxy.message().0, "wrapped");
        assert_eq!(proxy.message_type(), MessageType::of::<Envelope>());
    }

    #[test]
    fn erased_context_keeps_concrete_type() {
        let context = SendContext::new(Ping(7), DispatchMode::Send, CancellationToken::new());
        let erased = context.into_erased();

        assert_eq!(erased.message_type(), MessageType::of::<Ping>());
        assert_eq!(erased.downcast_message::<Ping>(), Some(&Ping(7)));
        assert!(erased.downcast_message::<Envelope>().is_none());
    }
}
