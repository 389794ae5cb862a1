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

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::common::BusError;
use crate::message::PayloadCache;

/// State shared by every context flowing through a pipe.
pub trait PipeContext: Send + Sync {
    /// The type-keyed payload bag owned by this context.
    fn payloads(&self) -> &PayloadCache;

    /// Signal observed by every suspendable operation on this context.
    fn cancellation_token(&self) -> &CancellationToken;

    /// Identity of the scope this context belongs to, used in diagnostics.
    fn scope(&self) -> &str;

    /// Runs `setup` exactly once for payload type `P` within this context.
    ///
    /// See [`PayloadCache::one_time_setup`].
    fn one_time_setup<P, S, Fut, F>(
        &self,
        setup: S,
        factory: F,
    ) -> impl Future<Output = Result<Arc<P>, BusError>> + Send
    where
        Self: Sized,
        P: Send + Sync + 'static,
        S: FnOnce(Arc<P>) -> Fut + Send,
        Fut: Future<Output = Result<(), BusError>> + Send,
        F: FnOnce() -> P + Send,
    {
        self.payloads()
            .one_time_setup(self.scope(), self.cancellation_token(), setup, factory)
    }
}
