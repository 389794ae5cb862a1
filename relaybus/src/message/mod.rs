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

//! Message contexts: the envelopes that flow through pipes.
//!
//! *   [`SendContext`]: an outgoing message, its envelope and payload bag.
//! *   [`ConsumeContext`]: an inbound message and an endpoint to publish from.
//! *   [`PayloadCache`]: the type-keyed bag with one-time setup.
//! *   [`PublishEndpoint`] and [`InMemoryOutbox`]: the publish side.

pub use consume_context::{ConsumeContext, EnvelopeMetadata};
pub use outbox::InMemoryOutbox;
pub use payload_cache::PayloadCache;
pub use publish_endpoint::PublishEndpoint;
pub use send_context::{DispatchMode, SendContext};

mod consume_context;
mod outbox;
mod payload_cache;
mod publish_endpoint;
mod send_context;
