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
#![allow(unused)]

use std::collections::BTreeMap;
use std::sync::Once;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use relaybus::message::{ConsumeContext, EnvelopeMetadata, PublishEndpoint};
use relaybus::prelude::*;

pub use messages::*;
pub use sagas::*;

pub mod messages;
pub mod sagas;

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests.
///
/// Output goes to `logs/relaybus_tests.txt`. `RUST_LOG` overrides the
/// default filter.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "relaybus_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info")
                .add_directive("relaybus::saga=trace".parse().unwrap())
                .add_directive("relaybus::topology=debug".parse().unwrap())
                .add_directive("relaybus::scheduling=debug".parse().unwrap())
                .add_directive("relaybus::message=debug".parse().unwrap())
        });

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// A consume context for `message` as if it had just arrived, publishing
/// through `endpoint`.
pub fn consume_context<M: BusMessage>(message: M, endpoint: PublishEndpoint) -> ConsumeContext<M> {
    consume_context_with(message, endpoint, CancellationToken::new())
}

pub fn consume_context_with<M: BusMessage>(
    message: M,
    endpoint: PublishEndpoint,
    cancellation: CancellationToken,
) -> ConsumeContext<M> {
    let envelope = EnvelopeMetadata {
        message_id: Uuid::new_v4(),
        correlation_id: None,
        conversation_id: None,
        source_address: None,
        destination_address: None,
        headers: BTreeMap::new(),
        sent_time: Utc::now(),
    };
    ConsumeContext::new(message, envelope, endpoint, cancellation)
}
