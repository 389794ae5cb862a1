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

use std::sync::Arc;

use crate::pipeline::{EmptyPipe, FilterPipe};
use crate::traits::{Filter, Pipe};

/// Composes filters, in the order added, into a single pipe.
pub struct PipeBuilder<C> {
    filters: Vec<Arc<dyn Filter<C>>>,
}

impl<C: Send + Sync + 'static> Default for PipeBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + Sync + 'static> PipeBuilder<C> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Appends `filter` to the chain.
    #[must_use]
    pub fn filter(mut self, filter: impl Filter<C> + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Appends an already shared filter.
    #[must_use]
    pub fn shared_filter(mut self, filter: Arc<dyn Filter<C>>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Builds the chain, terminated by an [`EmptyPipe`].
    pub fn build(self) -> Arc<dyn Pipe<C>> {
        self.build_with(Arc::new(EmptyPipe))
    }

    /// Builds the chain, terminated by `last`.
    pub fn build_with(self, last: Arc<dyn Pipe<C>>) -> Arc<dyn Pipe<C>> {
        self.filters
            .into_iter()
            .rev()
            .fold(last, |next, filter| {
                Arc::new(FilterPipe::new(filter, next)) as Arc<dyn Pipe<C>>
            })
    }
}
