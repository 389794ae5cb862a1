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
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happens when a non-initiating event finds no instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingInstancePolicy {
    /// Reject the event as `TransitionInvalid`.
    Fail,
    /// Drop the event; the consume succeeds.
    Discard,
}

/// A declared event, carried by messages of type `M`.
pub struct Event<M> {
    name: Arc<str>,
    _message: PhantomData<fn() -> M>,
}

impl<M> Event<M> {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            _message: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

impl<M> Clone for Event<M> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            _message: PhantomData,
        }
    }
}

impl<M> Debug for Event<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({}: {})", self.name, std::any::type_name::<M>())
    }
}

type KeyFn<M> = Arc<dyn Fn(&M) -> Uuid + Send + Sync>;
type QueryFn<I, M> = Arc<dyn Fn(&I, &M) -> bool + Send + Sync>;

/// How an event message finds its saga instances.
pub enum Correlation<I, M> {
    /// The message carries the correlation id. Resolves to zero or one instance.
    ById(KeyFn<M>),
    /// Instances matching the filter. Resolves to zero, one or many; when
    /// none match, an initiating event creates one with `new_id`.
    ByQuery { filter: QueryFn<I, M>, new_id: KeyFn<M> },
}

impl<I, M> Correlation<I, M> {
    pub fn by_id<F>(key: F) -> Self
    where
        F: Fn(&M) -> Uuid + Send + Sync + 'static,
    {
        Correlation::ById(Arc::new(key))
    }

    pub fn by_query<F, N>(filter: F, new_id: N) -> Self
    where
        F: Fn(&I, &M) -> bool + Send + Sync + 'static,
        N: Fn(&M) -> Uuid + Send + Sync + 'static,
    {
        Correlation::ByQuery {
            filter: Arc::new(filter),
            new_id: Arc::new(new_id),
        }
    }
}

impl<I, M> Clone for Correlation<I, M> {
    fn clone(&self) -> Self {
        match self {
            Correlation::ById(key) => Correlation::ById(Arc::clone(key)),
            Correlation::ByQuery { filter, new_id } => Correlation::ByQuery {
                filter: Arc::clone(filter),
                new_id: Arc::clone(new_id),
            },
        }
    }
}

impl<I, M> Debug for Correlation<I, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correlation::ById(_) => f.write_str("Correlation::ById"),
            Correlation::ByQuery { .. } => f.write_str("Correlation::ByQuery"),
        }
    }
}

/// An event bound to its correlation, as stored in a built state machine.
pub(crate) struct EventDefinition<I, M> {
    pub(crate) name: Arc<str>,
    pub(crate) correlation: Correlation<I, M>,
    pub(crate) missing_instance: Option<MissingInstancePolicy>,
}
