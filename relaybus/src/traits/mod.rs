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

//! The contracts every component of the bus is written against.
//!
//! *   [`BusMessage`]: implemented by every type that travels on the bus.
//! *   [`Filter`] and [`Pipe`]: one stage of a chain, and the rest of it.
//! *   [`Probe`]: read-only introspection of a composed chain.
//! *   [`PipeContext`]: payload bag, cancellation and one-time setup.
//! *   [`PublishTransport`]: where published messages end up.
//! *   [`Consumer`]: inbound message handling.

pub use bus_message::{BusMessage, MessageType};
pub use consumer::Consumer;
pub use pipe::{Filter, Pipe};
pub use pipe_context::PipeContext;
pub use probe::Probe;
pub use publish_transport::PublishTransport;

mod bus_message;
mod consumer;
mod pipe;
mod pipe_context;
mod probe;
mod publish_transport;
