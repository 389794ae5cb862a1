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

use async_trait::async_trait;

use crate::common::{BusError, PipeFuture};
use crate::pipeline::ProbeContext;
use crate::traits::{Filter, Pipe, Probe};

/// A pipe that does nothing. Terminates every built chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyPipe;

#[async_trait]
impl<C: Send + Sync> Pipe<C> for EmptyPipe {
    async fn send(&self, _context: &C) -> Result<(), BusError> {
        Ok(())
    }

    fn is_empty(&self) -> bool {
        true
    }
}

impl Probe for EmptyPipe {
    fn probe(&self, _context: &mut ProbeContext) {}
}

/// A filter bound to the rest of its chain.
pub struct FilterPipe<C> {
    filter: Arc<dyn Filter<C>>,
    next: Arc<dyn Pipe<C>>,
}

impl<C: Send + Sync> FilterPipe<C> {
    pub fn new(filter: Arc<dyn Filter<C>>, next: Arc<dyn Pipe<C>>) -> Self {
        Self { filter, next }
    }
}

#[async_trait]
impl<C: Send + Sync> Pipe<C> for FilterPipe<C> {
    async fn send(&self, context: &C) -> Result<(), BusError> {
        self.filter.send(context, self.next.as_ref()).await
    }
}

impl<C> Probe for FilterPipe<C> {
    fn probe(&self, context: &mut ProbeContext) {
        self.filter.probe(context);
        self.next.probe(context);
    }
}

/// Runs pipes one after another over the same context.
pub struct CombinedPipe<C> {
    pipes: Vec<Arc<dyn Pipe<C>>>,
}

impl<C: Send + Sync> CombinedPipe<C> {
    pub fn new(pipes: Vec<Arc<dyn Pipe<C>>>) -> Self {
        Self { pipes }
    }
}

#[async_trait]
impl<C: Send + Sync> Pipe<C> for CombinedPipe<C> {
    async fn send(&self, context: &C) -> Result<(), BusError> {
        for pipe in &self.pipes {
            pipe.send(context).await?;
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.pipes.iter().all(|pipe| pipe.is_empty())
    }
}

impl<C> Probe for CombinedPipe<C> {
    fn probe(&self, context: &mut ProbeContext) {
        let scope = context.create_scope("combined");
        for pipe in &self.pipes {
            pipe.probe(scope);
        }
    }
}

type FilterFn<C> =
    dyn for<'a> Fn(&'a C, &'a dyn Pipe<C>) -> PipeFuture<'a> + Send + Sync;

/// A filter written as a closure.
///
/// ```ignore
/// let audit = FnFilter::new("audit", |context: &SendContext<Ping>, next| {
///     Box::pin(async move {
///         context.set_header("audited", true);
///         next.send(context).await
///     })
/// });
/// ```
pub struct FnFilter<C> {
    name: &'static str,
    filter: Box<FilterFn<C>>,
}

impl<C: Send + Sync> FnFilter<C> {
    pub fn new<F>(name: &'static str, filter: F) -> Self
    where
        F: for<'a> Fn(&'a C, &'a dyn Pipe<C>) -> PipeFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name,
            filter: Box::new(filter),
        }
    }
}

impl<C> Debug for FnFilter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilter").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<C: Send + Sync> Filter<C> for FnFilter<C> {
    async fn send(&self, context: &C, next: &dyn Pipe<C>) -> Result<(), BusError> {
        (self.filter)(context, next).await
    }
}

impl<C> Probe for FnFilter<C> {
    fn probe(&self, context: &mut ProbeContext) {
        context.create_filter_scope(self.name);
    }
}

/// Continues the chain only when `predicate` accepts the context.
///
/// A rejected context ends the chain with `Ok(())`.
pub struct ContextFilter<C> {
    name: &'static str,
    predicate: Box<dyn Fn(&C) -> bool + Send + Sync>,
}

impl<C: Send + Sync> ContextFilter<C> {
    pub fn new<P>(name: &'static str, predicate: P) -> Self
    where
        P: Fn(&C) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            predicate: Box::new(predicate),
        }
    }
}

#[async_trait]
impl<C: Send + Sync> Filter<C> for ContextFilter<C> {
    async fn send(&self, context: &C, next: &dyn Pipe<C>) -> Result<(), BusError> {
        if (self.predicate)(context) {
            next.send(context).await
        } else {
            tracing::trace!(filter = self.name, "Context rejected, chain ends here");
            Ok(())
        }
    }
}

impl<C> Probe for ContextFilter<C> {
    fn probe(&self, context: &mut ProbeContext) {
        context.create_filter_scope("context").add("name", self.name);
    }
}

/// Sends the context through a side pipe, then continues the chain.
pub struct ForkFilter<C> {
    fork: Arc<dyn Pipe<C>>,
}

impl<C: Send + Sync> ForkFilter<C> {
    pub fn new(fork: Arc<dyn Pipe<C>>) -> Self {
        Self { fork }
    }
}

#[async_trait]
impl<C: Send + Sync> Filter<C> for ForkFilter<C> {
    async fn send(&self, context: &C, next: &dyn Pipe<C>) -> Result<(), BusError> {
        self.fork.send(context).await?;
        next.send(context).await
    }
}

impl<C> Probe for ForkFilter<C> {
    fn probe(&self, context: &mut ProbeContext) {
        let scope = context.create_filter_scope("fork");
        self.fork.probe(scope);
    }
}
