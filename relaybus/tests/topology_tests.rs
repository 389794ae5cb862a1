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
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use relaybus::common::TopologyConfig;
use relaybus::prelude::*;
use relaybus::topology::{
    BrokerCall, BrokerClient, BrokerTopology, ClientContext, ConfigureTopologyContext,
    ConfigureTopologyFilter, ConfirmingBrokerClient, EntitySettings, InMemoryBrokerClient, Queue,
    ReceiveSettings, SendSettings, Topic,
};

use crate::setup::*;

mod setup;

fn topology() -> anyhow::Result<Arc<BrokerTopology>> {
    Ok(BrokerTopology::builder()
        .topic(Topic::new("orders"))
        .topic(Topic::new("events").auto_delete(true))
        .queue(Queue::new("billing"))
        .queue(Queue::new("scratch").auto_delete(true))
        .subscribe("orders", "billing")
        .subscribe("events", "scratch")
        .build()?)
}

fn connection(name: &str, client: Arc<dyn BrokerClient>) -> anyhow::Result<ClientContext> {
    Ok(ClientContext::new(name, client, CancellationToken::new())?)
}

fn configure<S: EntitySettings + Clone>(
    settings: S,
    topology: Arc<BrokerTopology>,
    delete_auto_delete_on_shutdown: bool,
) -> Arc<dyn Pipe<ClientContext>> {
    let config = TopologyConfig {
        delete_auto_delete_on_shutdown,
    };
    PipeBuilder::<ClientContext>::new()
        .filter(ConfigureTopologyFilter::with_config(settings, topology, &config))
        .build()
}

fn tier(call: &BrokerCall) -> u8 {
    match call {
        BrokerCall::CreateTopic(_) => 0,
        BrokerCall::CreateQueue(_) => 1,
        BrokerCall::CreateQueueSubscription { .. } => 2,
        BrokerCall::DeleteTopic(_) | BrokerCall::DeleteQueue(_) => 3,
    }
}

#[bus_test]
async fn test_racing_first_users_declare_the_topology_once() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = Arc::new(InMemoryBrokerClient::new().with_latency(Duration::from_millis(5)));
    let context = connection("connection_a", broker.clone())?;
    let pipe = configure(SendSettings::new("orders"), topology()?, true);

    let results = join_all((0..6).map(|_| execute(&context, pipe.as_ref()))).await;
    results.into_iter().collect::<Result<Vec<_>, _>>()?;

    let calls = broker.calls();
    assert_eq!(broker.create_calls(), 6, "two topics, two queues, two subscriptions");
    assert!(
        calls.windows(2).all(|pair| tier(&pair[0]) <= tier(&pair[1])),
        "tiers are declared in order: {calls:?}"
    );
    assert!(broker.has_subscription("orders", "billing"));
    assert!(broker.has_subscription("events", "scratch"));

    let declared = context
        .payloads()
        .get::<ConfigureTopologyContext<SendSettings>>()
        .ok_or_else(|| anyhow::anyhow!("topology payload missing"))?;
    assert_eq!(declared.topics().len(), 2);
    assert_eq!(declared.queues().len(), 2);
    assert_eq!(declared.settings().entity_name(), "orders");
    assert!(context.payloads().contains::<SendSettings>());
    Ok(())
}

#[bus_test]
async fn test_each_connection_declares_and_identities_are_stable() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = Arc::new(InMemoryBrokerClient::new());
    let pipe = configure(SendSettings::new("orders"), topology()?, true);

    let first = connection("connection_a", broker.clone())?;
    execute(&first, pipe.as_ref()).await?;
    let billing = broker.queue("billing");

    let second = connection("connection_b", broker.clone())?;
    execute(&second, pipe.as_ref()).await?;

    assert_eq!(broker.create_calls(), 12);
    assert_eq!(broker.queue("billing"), billing);
    assert_eq!(broker.queue_count(), 2);
    Ok(())
}

#[bus_test]
async fn test_confirming_client_declares_twice_and_keeps_one_entity() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = Arc::new(InMemoryBrokerClient::new());
    let client = Arc::new(ConfirmingBrokerClient::new(Arc::clone(&broker)));
    let context = connection("confirming", client)?;
    let pipe = configure(SendSettings::new("orders"), topology()?, true);

    execute(&context, pipe.as_ref()).await?;

    assert_eq!(broker.create_calls(), 4 + 4 + 2);
    assert_eq!(broker.queue_count(), 2);
    let declared = context
        .payloads()
        .get::<ConfigureTopologyContext<SendSettings>>()
        .ok_or_else(|| anyhow::anyhow!("topology payload missing"))?;
    let billing = declared
        .queues()
        .into_iter()
        .find(|queue| queue.name == "billing");
    assert_eq!(billing, broker.queue("billing"));
    Ok(())
}

#[bus_test]
async fn test_receive_endpoints_remove_auto_delete_entities() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = Arc::new(InMemoryBrokerClient::new());
    let context = connection("receiver", broker.clone())?;
    let pipe = configure(ReceiveSettings::new("billing"), topology()?, true);

    execute(&context, pipe.as_ref()).await?;

    let calls = broker.calls();
    assert!(calls.contains(&BrokerCall::DeleteTopic("events".to_string())));
    assert!(calls.contains(&BrokerCall::DeleteQueue("scratch".to_string())));
    assert!(!calls.contains(&BrokerCall::DeleteTopic("orders".to_string())));
    assert!(broker.topic("events").is_none());
    assert!(broker.topic("orders").is_some());
    assert!(broker.queue("billing").is_some());

    // The second pass finds nothing to delete and nothing to declare.
    execute(&context, pipe.as_ref()).await?;
    assert_eq!(broker.create_calls(), 6);
    Ok(())
}

#[bus_test]
async fn test_teardown_is_skipped_for_send_endpoints_and_when_disabled() -> anyhow::Result<()> {
    initialize_tracing();
    let sending = Arc::new(InMemoryBrokerClient::new());
    let context = connection("sender", sending.clone())?;
    execute(&context, configure(SendSettings::new("orders"), topology()?, true).as_ref()).await?;
    assert!(sending.calls().iter().all(BrokerCall::is_create));

    let receiving = Arc::new(InMemoryBrokerClient::new());
    let context = connection("receiver", receiving.clone())?;
    execute(&context, configure(ReceiveSettings::new("billing"), topology()?, false).as_ref()).await?;
    assert!(receiving.calls().iter().all(BrokerCall::is_create));
    assert!(receiving.topic("events").is_some());
    Ok(())
}

#[bus_test]
async fn test_declaration_failure_is_cached_for_the_connection() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = Arc::new(InMemoryBrokerClient::new());
    broker.fail_on("scratch");
    let context = connection("connection_a", broker.clone())?;
    let pipe = configure(SendSettings::new("orders"), topology()?, true);

    match execute(&context, pipe.as_ref()).await {
        Err(BusError::SetupFailure { source, .. }) => {
            assert!(matches!(*source, BusError::CollaboratorFailure { .. }));
        }
        other => panic!("expected a setup failure, got {other:?}"),
    }
    let calls_after_failure = broker.calls().len();
    assert!(!broker.has_subscription("orders", "billing"), "subscriptions wait for every queue");

    let again = execute(&context, pipe.as_ref()).await;
    assert!(matches!(again, Err(BusError::SetupFailure { .. })));
    assert_eq!(broker.calls().len(), calls_after_failure);
    assert!(!context.payloads().contains::<SendSettings>());
    Ok(())
}

#[bus_test]
async fn test_cancelled_connection_fails_the_declaration() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = Arc::new(InMemoryBrokerClient::new().with_latency(Duration::from_millis(50)));
    let token = CancellationToken::new();
    let context = ClientContext::new("cancelled", broker.clone(), token.clone())?;
    token.cancel();

    let pipe = configure(SendSettings::new("orders"), topology()?, true);
    match execute(&context, pipe.as_ref()).await {
        Err(BusError::SetupFailure { source, .. }) => assert!(source.is_cancelled()),
        other => panic!("expected a cancelled setup, got {other:?}"),
    }
    assert!(broker.calls().is_empty());
    Ok(())
}
