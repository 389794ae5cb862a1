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

//! Shared building blocks used by every component of the bus.
//!
//! *   [`BusError`]: the single error taxonomy surfaced to callers.
//! *   [`BusConfig`] and the global [`CONFIG`]: file-backed runtime settings.
//! *   [`KeyedLock`]: per-key async exclusivity used by saga repositories.

pub use bus_error::{BoxError, BusError, TransitionRejection};
pub use config::{BusConfig, SagaConfig, SchedulingConfig, TopologyConfig, TracingConfig, CONFIG};
pub use keyed_lock::{KeyedGuard, KeyedLock};
pub use types::*;

mod bus_error;
mod config;
mod keyed_lock;
mod types;
