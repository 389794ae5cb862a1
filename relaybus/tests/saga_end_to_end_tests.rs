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

use relaybus::common::SagaConfig;
use relaybus::prelude::*;

use crate::setup::*;

mod setup;

/// Wires the test saga to an in-memory transport for its two command types.
fn connected() -> anyhow::Result<(Arc<InMemoryTransport>, Arc<InMemorySagaRepository<TestInstance>>)> {
    let saga = TestSaga::default();
    let repository = Arc::new(InMemorySagaRepository::new());
    let runtime = Arc::new(SagaRuntime::with_config(
        saga.machine()?,
        Arc::clone(&repository),
        SagaConfig::default(),
    ));
    let transport = InMemoryTransport::new();
    transport.connect::<StartTest>(runtime.clone());
    transport.connect::<UpdateTest>(runtime);
    Ok((transport, repository))
}

#[bus_test]
async fn test_published_commands_drive_the_saga() -> anyhow::Result<()> {
    initialize_tracing();
    let (transport, repository) = connected()?;
    let endpoint = transport.endpoint();
    let id = Uuid::new_v4();

    endpoint
        .publish(StartTest {
            correlation_id: id,
            key: "e2e".to_string(),
        })
        .await?;

    let started = transport.published_of::<TestStarted>();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].correlation_id, id);
    assert_eq!(started[0].key, "e2e");
    assert_eq!(
        repository.get(id).map(|instance| instance.current_state),
        Some("Active".to_string())
    );

    endpoint.publish(UpdateTest { test_id: id }).await?;

    let updated = transport.published_of::<TestUpdated>();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].correlation_id, id);
    assert!(!repository.contains(id), "the saga is finalized");
    assert!(transport.faults().is_empty());
    Ok(())
}

#[bus_test]
async fn test_unknown_key_faults_without_publishing() -> anyhow::Result<()> {
    initialize_tracing();
    let (transport, repository) = connected()?;
    let unknown = Uuid::new_v4();

    transport
        .endpoint()
        .publish(UpdateTest { test_id: unknown })
        .await?;

    let faults = transport.faults();
    assert_eq!(faults.len(), 1);
    assert!(matches!(
        faults[0].error.as_ref(),
        BusError::TransitionInvalid {
            correlation_id,
            reason: TransitionRejection::SagaNotFound,
            ..
        } if *correlation_id == unknown
    ));
    assert!(transport.published_of::<TestUpdated>().is_empty());
    assert_eq!(transport.published().len(), 1, "only the command itself");
    assert!(repository.is_empty());
    Ok(())
}

#[bus_test]
async fn test_saga_events_continue_the_conversation() -> anyhow::Result<()> {
    initialize_tracing();
    let (transport, _repository) = connected()?;

    transport
        .endpoint()
        .publish(StartTest {
            correlation_id: Uuid::new_v4(),
            key: "conversation".to_string(),
        })
        .await?;

    let published = transport.published();
    assert_eq!(published.len(), 2);
    let command = &published[0];
    let event = &published[1];
    assert_eq!(event.conversation_id(), Some(command.message_id()));
    Ok(())
}
