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

//! Saga state machines.
//!
//! A [`StateMachine`] is the immutable table mapping `(state, event)` to an
//! ordered chain of [`Activity`] steps. [`SagaRuntime`] correlates each
//! consumed event to its instances through the declared [`Correlation`],
//! runs the matching chain against a working copy and persists the result
//! through a [`SagaRepository`].
//!
//! Every instance starts in the implicit [`INITIAL`] state and ends in the
//! implicit [`FINAL`] state. Events that initiate the saga are bound with
//! [`StateMachineBuilder::initially`].

pub use activity::{Activity, BehaviorContext, Next};
pub use binder::EventActivityBinder;
pub use event::{Correlation, Event, MissingInstancePolicy};
pub use instance::{SagaInstance, State, FINAL, INITIAL};
pub use repository::{InMemorySagaRepository, RepositoryError, SagaRepository};
pub use runtime::{SagaOutcome, SagaRuntime, TransitionRecord};
pub use state_machine::{StateMachine, StateMachineBuilder};

mod activity;
mod binder;
mod event;
mod instance;
mod repository;
mod runtime;
mod state_machine;
