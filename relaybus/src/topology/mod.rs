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

//! The topology declaration protocol.
//!
//! [`ConfigureTopologyFilter`] sits on a [`ClientContext`] pipe and makes sure
//! every topic, queue and subscription of a [`BrokerTopology`] exists before
//! anything else uses the connection. The declaration runs once per
//! connection, however many first users race for it.
//!
//! Brokers are reached through the [`BrokerClient`] collaborator. The crate
//! ships [`InMemoryBrokerClient`] and the [`ConfirmingBrokerClient`]
//! decorator for bindings that need a repeated create.

pub use broker_client::{BrokerClient, BrokerClientError, ConfirmingBrokerClient, QueueInfo, TopicInfo};
pub use broker_topology::{BrokerTopology, BrokerTopologyBuilder, Queue, QueueSubscription, Topic};
pub use client_context::ClientContext;
pub use configure_topology_filter::{ConfigureTopologyContext, ConfigureTopologyFilter};
pub use in_memory_client::{BrokerCall, InMemoryBrokerClient};
pub use settings::{EntitySettings, ReceiveSettings, SendSettings};

mod broker_client;
mod broker_topology;
mod client_context;
mod configure_topology_filter;
mod in_memory_client;
mod settings;
