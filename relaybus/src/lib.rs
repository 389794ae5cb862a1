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

#![forbid(unsafe_code)]

//! # Relaybus
//!
//! A transport-agnostic message-bus runtime built on Tokio.
//!
//! ## Key Concepts
//!
//! - **Pipes and filters**: every message travels through a chain of
//!   [`Filter`](traits::Filter) stages composed with
//!   [`PipeBuilder`](pipeline::PipeBuilder). Stages share state through the
//!   context's [`PayloadCache`](message::PayloadCache), which also runs
//!   one-time setup per scope.
//! - **Topology**: [`ConfigureTopologyFilter`](topology::ConfigureTopologyFilter)
//!   declares topics, queues and subscriptions once per broker connection.
//! - **Recurring scheduling**:
//!   [`PublishRecurringMessageScheduler`](scheduling::PublishRecurringMessageScheduler)
//!   publishes schedule and cancel commands for an external job scheduler.
//! - **Sagas**: [`SagaRuntime`](saga::SagaRuntime) correlates consumed events
//!   to persisted instances and runs the transitions of an immutable
//!   [`StateMachine`](saga::StateMachine).
//!
//! Brokers, job schedulers and saga storage are collaborators behind traits.
//! The crate ships in-memory implementations of each.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relaybus::prelude::*;
//!
//! #[bus_message]
//! struct OrderSubmitted {
//!     order_id: Uuid,
//! }
//!
//! let transport = InMemoryTransport::new();
//! transport.endpoint().publish(OrderSubmitted { order_id: Uuid::new_v4() }).await?;
//! ```

extern crate self as relaybus;

pub use relaybus_macro::{bus_message, bus_test, saga_instance};
pub use uuid;

/// Shared utilities: errors, configuration and keyed locking.
pub mod common;

/// Send and consume contexts, payload cache and publish endpoints.
pub mod message;

/// Contracts implemented by messages, filters, transports and consumers.
pub mod traits;

/// The pipe/filter engine.
pub mod pipeline;

/// Broker topology declaration.
pub mod topology;

/// Recurring message scheduling.
pub mod scheduling;

/// Saga state machines and their runtime.
pub mod saga;

/// In-process transport for tests and examples.
pub mod testing;

/// A prelude module for conveniently importing the most commonly used items.
pub mod prelude {
    pub use relaybus_macro::{bus_message, bus_test, saga_instance};

    pub use async_trait::async_trait;
    pub use uuid::Uuid;

    pub use crate::common::{BusConfig, BusError, TransitionRejection};
    pub use crate::message::{ConsumeContext, PayloadCache, PublishEndpoint, SendContext};
    pub use crate::pipeline::{execute, probe, PipeBuilder, ProbeContext};
    pub use crate::saga::{
        Activity, BehaviorContext, Correlation, Event, InMemorySagaRepository, Next,
        SagaInstance, SagaOutcome, SagaRuntime, State, StateMachine, StateMachineBuilder,
    };
    pub use crate::testing::InMemoryTransport;
    pub use crate::traits::{BusMessage, Consumer, Filter, Pipe, PipeContext, Probe};
}
