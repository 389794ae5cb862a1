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

use std::fmt::{self, Debug};
use std::sync::Arc;

use uuid::Uuid;

/// Name of the implicit state of an instance that does not exist yet.
pub const INITIAL: &str = "Initial";

/// Name of the implicit terminal state.
pub const FINAL: &str = "Final";

/// A persisted saga record.
///
/// The current state is stored by name. Implement it with the
/// `#[saga_instance]` attribute.
pub trait SagaInstance: Clone + Debug + Send + Sync + 'static {
    /// A fresh instance for `correlation_id`, all other fields defaulted.
    fn new(correlation_id: Uuid) -> Self;

    fn correlation_id(&self) -> Uuid;

    fn current_state(&self) -> &str;

    fn set_current_state(&mut self, state: &str);
}

/// A declared state of a state machine.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct State {
    name: Arc<str>,
}

impl State {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
        }
    }

    /// The implicit state before an instance exists.
    pub fn initial() -> Self {
        Self::new(INITIAL)
    }

    /// The implicit terminal state.
    pub fn final_state() -> Self {
        Self::new(FINAL)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn is_reserved(&self) -> bool {
        &*self.name == INITIAL || &*self.name == FINAL
    }
}

impl Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State({})", self.name)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
