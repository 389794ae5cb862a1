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
use crate::message::SendContext;
use crate::traits::BusMessage;

/// The transport a [`PublishEndpoint`](crate::message::PublishEndpoint)
/// hands finished contexts to.
///
/// Implementations own the wire I/O. The bus ships only in-memory transports.
#[async_trait]
pub trait PublishTransport: Send + Sync {
    /// Delivers one outgoing message.
    async fn publish(&self, context: SendContext<dyn BusMessage>) -> Result<(), BusError>;
}
