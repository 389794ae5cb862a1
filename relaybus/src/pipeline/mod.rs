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

//! The pipe/filter engine.
//!
//! A chain is built once with [`PipeBuilder`] and then executed any number of
//! times with [`execute`]. Each filter sees the context and the rest of the
//! chain; it may act and continue, short-circuit, wrap the context in a proxy,
//! or fail. Failures propagate to the caller of `execute` unchanged.
//!
//! ```ignore
//! let pipe = PipeBuilder::<SendContext<Ping>>::new()
//!     .filter(ContextFilter::new("non-zero", |ctx| ctx.message().0 > 0))
//!     .filter(FnFilter::new("stamp", |ctx, next| Box::pin(async move {
//!         ctx.set_header("stamped", true);
//!         next.send(ctx).await
//!     })))
//!     .build();
//!
//! execute(&context, pipe.as_ref()).await?;
//! ```

use tracing::{instrument, trace};

use crate::common::BusError;
use crate::traits::Pipe;

pub use filters::{CombinedPipe, ContextFilter, EmptyPipe, FilterPipe, FnFilter, ForkFilter};
pub use pipe_builder::PipeBuilder;
pub use probe::ProbeContext;

mod filters;
mod pipe_builder;
mod probe;

/// Runs `context` through `pipe`.
///
/// # Errors
///
/// Returns the first error raised by any stage.
#[instrument(skip_all, fields(context = std::any::type_name::<C>()))]
pub async fn execute<C: Send + Sync>(context: &C, pipe: &dyn Pipe<C>) -> Result<(), BusError> {
    let result = pipe.send(context).await;
    if let Err(error) = &result {
        trace!(%error, "Pipe faulted");
    }
    result
}

/// Collects the diagnostic tree of `pipe`.
pub fn probe<C>(pipe: &dyn Pipe<C>) -> ProbeContext {
    let mut context = ProbeContext::new();
    pipe.probe(&mut context);
    context
}
