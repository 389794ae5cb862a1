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

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use relaybus::message::DispatchMode;
use relaybus::pipeline::{CombinedPipe, ContextFilter, FnFilter, ForkFilter};
use relaybus::prelude::*;

use crate::setup::*;

mod setup;

type PingContext = SendContext<Ping>;
type Journal = Arc<Mutex<Vec<&'static str>>>;

fn context(value: u32) -> PingContext {
    SendContext::new(Ping(value), DispatchMode::Send, CancellationToken::new())
}

fn journaling(name: &'static str, journal: &Journal) -> FnFilter<PingContext> {
    let journal = Arc::clone(journal);
    FnFilter::<PingContext>::new(name, move |context, next| {
        let journal = Arc::clone(&journal);
        Box::pin(async move {
            journal.lock().push(name);
            next.send(context).await
        })
    })
}

/// A sink that journals every context reaching the end of the chain.
struct JournalPipe {
    journal: Journal,
}

#[async_trait]
impl Pipe<PingContext> for JournalPipe {
    async fn send(&self, _context: &PingContext) -> Result<(), BusError> {
        self.journal.lock().push("sink");
        Ok(())
    }
}

impl Probe for JournalPipe {
    fn probe(&self, context: &mut ProbeContext) {
        context.add("sink", "journal");
    }
}

#[bus_test]
async fn test_filters_run_in_order_and_may_short_circuit() -> anyhow::Result<()> {
    initialize_tracing();
    let journal: Journal = Arc::default();
    let pipe = PipeBuilder::<PingContext>::new()
        .filter(journaling("first", &journal))
        .filter(ContextFilter::<PingContext>::new("positive", |context| {
            context.message().0 > 0
        }))
        .filter(journaling("last", &journal))
        .build_with(Arc::new(JournalPipe {
            journal: Arc::clone(&journal),
        }));

    execute(&context(1), pipe.as_ref()).await?;
    assert_eq!(*journal.lock(), vec!["first", "last", "sink"]);

    journal.lock().clear();
    execute(&context(0), pipe.as_ref()).await?;
    assert_eq!(*journal.lock(), vec!["first"], "the rejected context stops silently");
    Ok(())
}

#[bus_test]
async fn test_errors_propagate_and_stop_the_chain() -> anyhow::Result<()> {
    initialize_tracing();
    let journal: Journal = Arc::default();
    let pipe = PipeBuilder::<PingContext>::new()
        .filter(FnFilter::<PingContext>::new("reject", |_context, _next| {
            Box::pin(async { Err(BusError::argument("ping", "rejected")) })
        }))
        .filter(journaling("after", &journal))
        .build();

    let result = execute(&context(1), pipe.as_ref()).await;
    assert!(matches!(result, Err(BusError::ArgumentInvalid { argument: "ping", .. })));
    assert!(journal.lock().is_empty());
    Ok(())
}

#[bus_test]
async fn test_fork_and_combined_pipes() -> anyhow::Result<()> {
    initialize_tracing();
    let journal: Journal = Arc::default();
    let branch = PipeBuilder::<PingContext>::new()
        .filter(journaling("branch", &journal))
        .build();
    let main = PipeBuilder::<PingContext>::new()
        .filter(ForkFilter::new(branch))
        .filter(journaling("main", &journal))
        .build();
    let tail = PipeBuilder::<PingContext>::new()
        .filter(journaling("tail", &journal))
        .build();
    let combined = CombinedPipe::new(vec![main, tail]);

    execute(&context(1), &combined).await?;
    assert_eq!(*journal.lock(), vec!["branch", "main", "tail"]);
    assert!(!combined.is_empty());
    Ok(())
}

#[bus_test]
async fn test_filters_share_state_through_payloads() -> anyhow::Result<()> {
    initialize_tracing();

    #[derive(Debug, Default)]
    struct Attempts(Mutex<u32>);

    let pipe = PipeBuilder::<PingContext>::new()
        .filter(FnFilter::<PingContext>::new("count", |context, next| {
            Box::pin(async move {
                let attempts = context.payloads().get_or_add(Attempts::default);
                *attempts.0.lock() += 1;
                next.send(context).await
            })
        }))
        .filter(FnFilter::<PingContext>::new("stamp", |context, next| {
            Box::pin(async move {
                let attempts = context.payloads().get::<Attempts>().map_or(0, |a| *a.0.lock());
                context.set_header("attempts", attempts);
                next.send(context).await
            })
        }))
        .build();

    let ping = context(3);
    execute(&ping, pipe.as_ref()).await?;
    assert_eq!(ping.header("attempts"), Some(serde_json::json!(1)));
    Ok(())
}

#[test]
fn test_probe_describes_the_chain() {
    let journal: Journal = Arc::default();
    let pipe = PipeBuilder::<PingContext>::new()
        .filter(journaling("first", &journal))
        .filter(ContextFilter::<PingContext>::new("positive", |_| true))
        .build();

    let described = probe(pipe.as_ref()).to_json();
    assert_eq!(
        described,
        serde_json::json!({
            "filters": [
                { "filterType": "first" },
                { "filterType": "context", "name": "positive" }
            ]
        })
    );
    assert!(PipeBuilder::<PingContext>::new().build().is_empty());
}
