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

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::trace;

use crate::common::BusError;
use crate::message::SendContext;
use crate::pipeline::{CombinedPipe, ProbeContext};
use crate::traits::{BusMessage, Pipe, Probe};

/// Keys with this prefix in a value bag become headers, not message fields.
pub const HEADER_PREFIX: &str = "__Header_";

type Converter =
    Arc<dyn Fn(Value) -> Result<Box<dyn Any + Send + Sync>, serde_json::Error> + Send + Sync>;

/// A message built from a value bag and the pipe that applies the bag's headers.
pub struct InitializedMessage<M> {
    pub message: M,
    pub pipe: Arc<dyn Pipe<SendContext<M>>>,
}

impl<M: Debug> Debug for InitializedMessage<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializedMessage")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Converts loosely-typed value bags into messages.
///
/// Only types registered with [`MessageInitializerRegistry::register`] can be
/// initialized. The registry is an ordinary value; hand it to the components
/// that need it.
#[derive(Clone, Default)]
pub struct MessageInitializerRegistry {
    converters: Arc<DashMap<TypeId, Converter>>,
}

impl Debug for MessageInitializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageInitializerRegistry")
            .field("converters", &self.converters.len())
            .finish()
    }
}

impl MessageInitializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the serde converter for `M`.
    pub fn register<M: BusMessage + DeserializeOwned>(&self) -> &Self {
        let converter: Converter = Arc::new(|values| {
            serde_json::from_value::<M>(values).map(|message| Box::new(message) as Box<dyn Any + Send + Sync>)
        });
        self.converters.insert(TypeId::of::<M>(), converter);
        self
    }

    pub fn is_registered<M: BusMessage>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<M>())
    }

    /// Builds an `M` from `values`.
    ///
    /// `__Header_<name>` entries are removed from the bag and applied as the
    /// header `<name>` by the returned pipe, which then runs `pipe`.
    ///
    /// # Errors
    ///
    /// [`BusError::ArgumentInvalid`] if `values` is not an object, `M` is not
    /// registered, or the remaining fields do not form an `M`.
    pub fn initialize<M: BusMessage>(
        &self,
        values: Value,
        pipe: Option<Arc<dyn Pipe<SendContext<M>>>>,
    ) -> Result<InitializedMessage<M>, BusError> {
        let Value::Object(values) = values else {
            return Err(BusError::argument("values", "expected an object"));
        };
        let converter = self
            .converters
            .get(&TypeId::of::<M>())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                BusError::argument(
                    "values",
                    format!("no initializer registered for {}", std::any::type_name::<M>()),
                )
            })?;

        let mut fields = Map::new();
        let mut headers = BTreeMap::new();
        for (key, value) in values {
            match key.strip_prefix(HEADER_PREFIX) {
                Some(header) => {
                    headers.insert(header.to_string(), value);
                }
                None => {
                    fields.insert(key, value);
                }
            }
        }

        let message = converter(Value::Object(fields))
            .map_err(|error| BusError::argument("values", error.to_string()))?
            .downcast::<M>()
            .map_err(|_| BusError::argument("values", "initializer produced another type"))?;
        trace!(message_type = std::any::type_name::<M>(), headers = headers.len(), "Initialized message");

        let header_pipe: Arc<dyn Pipe<SendContext<M>>> = Arc::new(SetHeadersPipe { headers });
        let pipe = match pipe {
            Some(pipe) => Arc::new(CombinedPipe::new(vec![header_pipe, pipe])) as Arc<dyn Pipe<SendContext<M>>>,
            None => header_pipe,
        };

        Ok(InitializedMessage {
            message: *message,
            pipe,
        })
    }
}

/// Copies fixed headers onto each context.
#[derive(Debug, Clone)]
struct SetHeadersPipe {
    headers: BTreeMap<String, Value>,
}

#[async_trait]
impl<M: ?Sized + Send + Sync> Pipe<SendContext<M>> for SetHeadersPipe {
    async fn send(&self, context: &SendContext<M>) -> Result<(), BusError> {
        for (key, value) in &self.headers {
            context.set_header(key.clone(), value.clone());
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl Probe for SetHeadersPipe {
    fn probe(&self, context: &mut ProbeContext) {
        let scope = context.create_filter_scope("setHeaders");
        for key in self.headers.keys() {
            scope.create_scope("header").add("name", key.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::message::DispatchMode;

    #[crate::bus_message(serde)]
    #[derive(PartialEq)]
    struct Reminder {
        text: String,
    }

    #[tokio::test]
    async fn header_keys_become_headers() {
        let registry = MessageInitializerRegistry::new();
        registry.register::<Reminder>();

        let initialized = registry
            .initialize::<Reminder>(
                serde_json::json!({ "text": "water the plants", "__Header_Tenant": "acme" }),
                None,
            )
            .unwrap();
        assert_eq!(initialized.message, Reminder { text: "water the plants".to_string() });

        let context = SendContext::new(initialized.message.clone(), DispatchMode::Send, CancellationToken::new());
        initialized.pipe.send(&context).await.unwrap();
        assert_eq!(context.header("Tenant"), Some(Value::from("acme")));
        assert!(context.header("text").is_none());
    }

    #[test]
    fn unregistered_types_are_rejected() {
        let registry = MessageInitializerRegistry::new();
        let result = registry.initialize::<Reminder>(serde_json::json!({ "text": "x" }), None);
        assert!(matches!(result, Err(BusError::ArgumentInvalid { argument: "values", .. })));
    }
}
