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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use relaybus::message::DispatchMode;
use relaybus::prelude::*;

use crate::setup::*;

mod setup;

#[derive(Debug, Default)]
struct Declared;

fn context(cancellation: CancellationToken) -> SendContext<Ping> {
    SendContext::new(Ping(1), DispatchMode::Send, cancellation)
}

async fn declare(
    context: &SendContext<Ping>,
    calls: &Arc<AtomicUsize>,
    outcome: Result<(), &'static str>,
) -> Result<Arc<Declared>, BusError> {
    let calls = Arc::clone(calls);
    context
        .one_time_setup(
            move |_payload: Arc<Declared>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                outcome.map_err(|reason| BusError::argument("setup", reason))
            },
            Declared::default,
        )
        .await
}

#[bus_test]
async fn test_concurrent_callers_share_a_single_setup() -> anyhow::Result<()> {
    initialize_tracing();
    let context = context(CancellationToken::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let results = join_all((0..8).map(|_| declare(&context, &calls, Ok(())))).await;
    let payloads = results.into_iter().collect::<Result<Vec<_>, _>>()?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(payloads.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert!(context.payloads().contains::<Declared>());

    let later = declare(&context, &calls, Ok(())).await?;
    assert!(Arc::ptr_eq(&later, &payloads[0]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[bus_test]
async fn test_failures_are_cached_until_reset() -> anyhow::Result<()> {
    initialize_tracing();
    let context = context(CancellationToken::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let results = join_all((0..4).map(|_| declare(&context, &calls, Err("broker down")))).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        match result {
            Err(BusError::SetupFailure { source, .. }) => {
                assert!(matches!(*source, BusError::ArgumentInvalid { argument: "setup", .. }));
            }
            other => panic!("expected a cached setup failure, got {other:?}"),
        }
    }

    let again = declare(&context, &calls, Ok(())).await;
    assert!(matches!(again, Err(BusError::SetupFailure { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "a cached failure never retries");
    assert!(!context.payloads().contains::<Declared>());

    context.payloads().reset_one_time_setup::<Declared>();
    declare(&context, &calls, Ok(())).await?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[bus_test]
async fn test_cancellation_is_cached_as_a_setup_failure() -> anyhow::Result<()> {
    initialize_tracing();
    let token = CancellationToken::new();
    let context = context(token.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = {
        let calls = Arc::clone(&calls);
        context.one_time_setup(
            move |_payload: Arc<Declared>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), BusError>(())
            },
            Declared::default,
        )
    };
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(slow, canceller);

    match result {
        Err(BusError::SetupFailure { source, .. }) => assert!(source.is_cancelled()),
        other => panic!("expected a cancelled setup, got {other:?}"),
    }
    let again = declare(&context, &calls, Ok(())).await;
    assert!(matches!(again, Err(BusError::SetupFailure { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[bus_test]
async fn test_each_context_runs_its_own_setup() -> anyhow::Result<()> {
    initialize_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let first = context(CancellationToken::new());
    let second = context(CancellationToken::new());

    let first_payload = declare(&first, &calls, Ok(())).await?;
    let second_payload = declare(&second, &calls, Ok(())).await?;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&first_payload, &second_payload));
    Ok(())
}
