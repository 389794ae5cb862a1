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

use async_trait::async_trait;

use crate::common::BusError;
use crate::traits::Probe;

/// The remainder of a filter chain, sink included.
///
/// A filter receives the next pipe as an opaque continuation. Calling
/// [`Pipe::send`] continues the chain; not calling it short-circuits, which
/// is a valid outcome rather than an error.
#[async_trait]
pub trait Pipe<C>: Probe + Send + Sync {
    /// Sends `context` through the rest of the chain.
    async fn send(&self, context: &C) -> Result<(), BusError>;

    /// Returns `true` for a pipe that does nothing, so callers can skip
    /// building contexts for it.
    fn is_empty(&self) -> bool {
        false
    }
}

/// One stage of a pipeline.
#[async_trait]
pub trait Filter<C>: Probe + Send + Sync {
    /// Processes `context`, optionally continuing with `next`.
    async fn send(&self, context: &C, next: &dyn Pipe<C>) -> Result<(), BusError>;
}
