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

//! Common future and handler aliases used across the pipeline and saga modules.

use futures::future::BoxFuture;

use crate::common::BusError;

/// The future returned by pipes, filters and closure stages.
pub type PipeFuture<'a> = BoxFuture<'a, Result<(), BusError>>;

/// The future returned by saga activities and fault handlers.
pub type ActivityFuture<'a> = BoxFuture<'a, anyhow::Result<()>>;
