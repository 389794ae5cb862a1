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
use std::any::{Any, TypeId};
use std::fmt::{self, Debug};

use dyn_clone::DynClone;

/// A marker trait for types that can travel through the bus as a message.
///
/// Combines `Any + Send + Sync + Debug` with [`DynClone`] so a message can be
/// shared between tasks, cloned behind a trait object, downcast back to its
/// concrete type, and logged.
///
/// A blanket implementation covers every qualifying type; message structs only
/// need to derive `Clone` and `Debug` (see the `#[bus_message]` attribute).
pub trait BusMessage: DynClone + Any + Send + Sync + Debug {
    /// Returns the message as a dynamic [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the identity of the concrete message type.
    fn message_type(&self) -> MessageType;
}

dyn_clone::clone_trait_object!(BusMessage);

impl<T> BusMessage for T
where
    T: Any + Send + Sync + Debug + DynClone + 'static,
{
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn message_type(&self) -> MessageType {
        MessageType::of::<T>()
    }
}

/// Opaque identity of a message type.
///
/// Equality and hashing use the [`TypeId`] only; the name is the fully
/// qualified Rust type name and is carried for diagnostics and for the
/// `payload_type` list of scheduling commands.
#[derive(Clone, Copy)]
pub struct MessageType {
    id: TypeId,
    name: &'static str,
}

impl MessageType {
    /// Returns the identity of `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The [`TypeId`] of the message type.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// The fully qualified type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The unqualified type name, e.g. `OrderSubmitted`.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// URN form used in envelopes, e.g. `urn:message:orders:OrderSubmitted`.
    #[must_use]
    pub fn urn(&self) -> String {
        let base = self.name.split('<').next().unwrap_or(self.name);
        format!("urn:message:{}", base.replace("::", ":"))
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageType {}

impl std::hash::Hash for MessageType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
