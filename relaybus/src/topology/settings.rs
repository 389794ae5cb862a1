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

use std::fmt::Debug;

/// Settings of the endpoint a client context serves.
pub trait EntitySettings: Debug + Send + Sync + 'static {
    /// Name of the entity messages are sent to or received from.
    fn entity_name(&self) -> &str;

    /// `true` for receive endpoints, whose auto-delete entities are removed
    /// when the connection's pipe completes.
    fn is_receive(&self) -> bool {
        false
    }
}

/// A send endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSettings {
    pub entity_name: String,
}

impl SendSettings {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
        }
    }
}

impl EntitySettings for SendSettings {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }
}

/// A receive endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveSettings {
    pub entity_name: String,
}

impl ReceiveSettings {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
        }
    }
}

impl EntitySettings for ReceiveSettings {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    fn is_receive(&self) -> bool {
        true
    }
}
