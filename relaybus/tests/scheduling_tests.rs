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

use serde_json::json;
use url::Url;

use relaybus::common::SchedulingConfig;
use relaybus::prelude::*;
use relaybus::scheduling::{
    CancelScheduledMessage, CancelScheduledRecurringMessage, InMemoryJobScheduler, JobKey,
    MessageInitializerRegistry, PublishRecurringMessageScheduler, RecurringSchedule,
    RecurringScheduleConsumer, ScheduleRecurringMessage, TriggerKey,
};
use relaybus::traits::MessageType;

use crate::setup::*;

mod setup;

fn destination() -> anyhow::Result<Url> {
    Ok(Url::parse("memory://queues/reminders")?)
}

fn nightly() -> RecurringSchedule {
    RecurringSchedule::new("nightly", "reports", "0 0 2 * * ?")
        .time_zone("UTC")
        .description("Nightly reminder")
}

fn scheduler(transport: &InMemoryTransport) -> PublishRecurringMessageScheduler {
    let registry = MessageInitializerRegistry::new();
    registry.register::<Reminder>();
    PublishRecurringMessageScheduler::new(transport.endpoint(), registry)
}

/// A transport whose scheduling commands land in an in-memory job scheduler.
fn connected_scheduler() -> (Arc<InMemoryTransport>, Arc<InMemoryJobScheduler>) {
    let transport = InMemoryTransport::new();
    let jobs = Arc::new(InMemoryJobScheduler::new());
    let consumer = Arc::new(RecurringScheduleConsumer::with_config(
        jobs.clone(),
        &SchedulingConfig::default(),
    ));
    transport.connect::<ScheduleRecurringMessage>(consumer.clone());
    transport.connect::<CancelScheduledRecurringMessage>(consumer.clone());
    transport.connect::<CancelScheduledMessage>(consumer);
    (transport, jobs)
}

#[bus_test]
async fn test_schedule_publishes_a_correlated_command() -> anyhow::Result<()> {
    initialize_tracing();
    let transport = InMemoryTransport::new();
    let reminder = Reminder {
        text: "stand-up".to_string(),
    };

    let scheduled = scheduler(&transport)
        .schedule_recurring_send(destination()?, nightly(), reminder.clone())
        .await?;

    assert_eq!(*scheduled.payload, reminder);
    assert_eq!(scheduled.schedule.schedule_id, "nightly");

    let published = transport.published();
    assert_eq!(published.len(), 1);
    let commands = transport.published_of::<ScheduleRecurringMessage>();
    let command = &commands[0];
    assert_eq!(published[0].correlation_id(), Some(command.correlation_id));
    assert_eq!(command.destination, destination()?);
    assert_eq!(command.schedule, scheduled.schedule);
    assert_eq!(command.payload_type, vec![MessageType::of::<Reminder>().urn()]);
    assert_eq!(command.payload_as::<Reminder>(), Some(&reminder));
    Ok(())
}

#[bus_test]
async fn test_incomplete_schedules_are_rejected_before_publishing() -> anyhow::Result<()> {
    initialize_tracing();
    let transport = InMemoryTransport::new();
    let scheduler = scheduler(&transport);
    let reminder = Reminder {
        text: "never".to_string(),
    };

    let missing_id = scheduler
        .schedule_recurring_send(
            destination()?,
            RecurringSchedule::new(" ", "reports", "0 0 2 * * ?"),
            reminder.clone(),
        )
        .await;
    assert!(matches!(
        missing_id,
        Err(BusError::ArgumentInvalid { argument: "schedule_id", .. })
    ));

    let missing_cron = scheduler
        .schedule_recurring_send(destination()?, RecurringSchedule::new("nightly", "reports", ""), reminder)
        .await;
    assert!(matches!(
        missing_cron,
        Err(BusError::ArgumentInvalid { argument: "cron_expression", .. })
    ));

    let cancel = scheduler.cancel_scheduled_recurring_send("nightly", "").await;
    assert!(matches!(
        cancel,
        Err(BusError::ArgumentInvalid { argument: "schedule_group", .. })
    ));
    assert!(transport.published().is_empty());
    Ok(())
}

#[bus_test]
async fn test_value_bags_become_messages_and_headers() -> anyhow::Result<()> {
    initialize_tracing();
    let transport = InMemoryTransport::new();

    let scheduled = scheduler(&transport)
        .schedule_recurring_send_values::<Reminder>(
            destination()?,
            nightly(),
            json!({ "text": "backup", "__Header_Priority": "high" }),
            None,
        )
        .await?;

    assert_eq!(scheduled.payload.text, "backup");
    let published = transport.published();
    assert_eq!(published[0].header("Priority"), Some(json!("high")));
    assert_eq!(published[0].header("__Header_Priority"), None);

    let unknown = scheduler(&transport)
        .schedule_recurring_send_values::<Ping>(destination()?, nightly(), json!({}), None)
        .await;
    assert!(matches!(unknown, Err(BusError::ArgumentInvalid { argument: "values", .. })));
    Ok(())
}

#[bus_test]
async fn test_payload_pipes_run_against_the_payload() -> anyhow::Result<()> {
    initialize_tracing();
    let transport = InMemoryTransport::new();
    let stamp = PipeBuilder::<SendContext<Reminder>>::new()
        .filter(relaybus::pipeline::FnFilter::<SendContext<Reminder>>::new(
            "tenant",
            |context, next| {
                Box::pin(async move {
                    context.set_header("tenant", context.message().text.clone());
                    next.send(context).await
                })
            },
        ))
        .build();

    scheduler(&transport)
        .schedule_recurring_send_with(
            destination()?,
            nightly(),
            Reminder {
                text: "acme".to_string(),
            },
            stamp,
        )
        .await?;

    let published = transport.published();
    assert_eq!(published[0].header("tenant"), Some(json!("acme")));
    assert!(published[0].downcast_message::<ScheduleRecurringMessage>().is_some());
    Ok(())
}

#[bus_test]
async fn test_schedule_and_cancel_through_the_job_scheduler() -> anyhow::Result<()> {
    initialize_tracing();
    let (transport, jobs) = connected_scheduler();
    let scheduler = scheduler(&transport);
    let trigger = TriggerKey::new("Recurring.Trigger.nightly", "reports");
    let job = JobKey::new("nightly", "reports");

    scheduler
        .schedule_recurring_send(
            destination()?,
            nightly(),
            Reminder {
                text: "stand-up".to_string(),
            },
        )
        .await?;
    assert!(jobs.has_trigger(&trigger));
    let stored = jobs
        .job(&job)
        .ok_or_else(|| anyhow::anyhow!("job was not stored"))?;
    assert_eq!(stored.schedule.cron_expression, "0 0 2 * * ?");

    scheduler.cancel_scheduled_recurring_send("nightly", "reports").await?;
    assert!(!jobs.has_trigger(&trigger));
    assert!(!jobs.has_job(&job));

    let cancels = transport.published_of::<CancelScheduledRecurringMessage>();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].schedule_group, "reports");

    // Cancelling again finds nothing and still succeeds.
    scheduler.cancel_scheduled_recurring_send("nightly", "reports").await?;
    assert!(transport.faults().is_empty());
    Ok(())
}

#[bus_test]
async fn test_rescheduling_replaces_the_trigger() -> anyhow::Result<()> {
    initialize_tracing();
    let (transport, jobs) = connected_scheduler();
    let scheduler = scheduler(&transport);

    for text in ["first", "second"] {
        scheduler
            .schedule_recurring_send(
                destination()?,
                nightly(),
                Reminder {
                    text: text.to_string(),
                },
            )
            .await?;
    }

    assert_eq!(jobs.trigger_count(), 1);
    let stored = jobs
        .job(&JobKey::new("nightly", "reports"))
        .ok_or_else(|| anyhow::anyhow!("job was not stored"))?;
    assert_eq!(stored.payload_as::<Reminder>().map(|r| r.text.as_str()), Some("second"));
    Ok(())
}

#[bus_test]
async fn test_cancelling_an_unknown_token_is_a_no_op() -> anyhow::Result<()> {
    initialize_tracing();
    let (transport, _jobs) = connected_scheduler();

    scheduler(&transport).cancel_scheduled_send(Uuid::new_v4()).await?;

    assert_eq!(transport.published_of::<CancelScheduledMessage>().len(), 1);
    assert!(transport.faults().is_empty());
    Ok(())
}
