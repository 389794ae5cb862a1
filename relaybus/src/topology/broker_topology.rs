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

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::BusError;
use crate::pipeline::ProbeContext;
use crate::traits::Probe;

/// A publish target that fans out to its subscribed queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub attributes: BTreeMap<String, String>,
}

impl Topic {
    /// A durable topic that survives shutdown.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            auto_delete: false,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    #[must_use]
    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A receive endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub attributes: BTreeMap<String, String>,
}

impl Queue {
    /// A durable queue that survives shutdown.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            auto_delete: false,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    #[must_use]
    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Binds a queue to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueSubscription {
    pub topic: String,
    pub queue: String,
}

/// The messaging resources a connection must provision before use.
///
/// Built once with [`BrokerTopology::builder`] and shared read-only between
/// every connection of the same configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerTopology {
    topics: Vec<Topic>,
    queues: Vec<Queue>,
    subscriptions: Vec<QueueSubscription>,
}

impl BrokerTopology {
    pub fn builder() -> BrokerTopologyBuilder {
        BrokerTopologyBuilder::default()
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }

    pub fn subscriptions(&self) -> &[QueueSubscription] {
        &self.subscriptions
    }

    /// Total number of entities to declare.
    pub fn entity_count(&self) -> usize {
        self.topics.len() + self.queues.len() + self.subscriptions.len()
    }
}

impl Probe for BrokerTopology {
    fn probe(&self, context: &mut ProbeContext) {
        for topic in &self.topics {
            context
                .create_scope("topic")
                .add("name", topic.name.as_str())
                .add("durable", topic.durable)
                .add("autoDelete", topic.auto_delete);
        }
        for queue in &self.queues {
            context
                .create_scope("queue")
                .add("name", queue.name.as_str())
                .add("durable", queue.durable)
                .add("autoDelete", queue.auto_delete);
        }
        for subscription in &self.subscriptions {
            context
                .create_scope("queueSubscription")
                .add("source", subscription.topic.as_str())
                .add("destination", subscription.queue.as_str());
        }
    }
}

/// Collects entities and validates them into a [`BrokerTopology`].
#[derive(Debug, Default)]
pub struct BrokerTopologyBuilder {
    topics: Vec<Topic>,
    queues: Vec<Queue>,
    subscriptions: Vec<QueueSubscription>,
}

impl BrokerTopologyBuilder {
    #[must_use]
    pub fn topic(mut self, topic: Topic) -> Self {
        self.topics.push(topic);
        self
    }

    #[must_use]
    pub fn queue(mut self, queue: Queue) -> Self {
        self.queues.push(queue);
        self
    }

    /// Subscribes the queue named `queue` to the topic named `topic`.
    #[must_use]
    pub fn subscribe(mut self, topic: impl Into<String>, queue: impl Into<String>) -> Self {
        self.subscriptions.push(QueueSubscription {
            topic: topic.into(),
            queue: queue.into(),
        });
        self
    }

    /// Validates and freezes the topology.
    ///
    /// # Errors
    ///
    /// [`BusError::ArgumentInvalid`] for an empty or duplicated name, a
    /// duplicated subscription, or a subscription naming an undeclared
    /// topic or queue.
    pub fn build(self) -> Result<Arc<BrokerTopology>, BusError> {
        let topic_names = unique_names("topic", self.topics.iter().map(|t| t.name.as_str()))?;
        let queue_names = unique_names("queue", self.queues.iter().map(|q| q.name.as_str()))?;

        let mut seen = HashSet::new();
        for subscription in &self.subscriptions {
            if !topic_names.contains(subscription.topic.as_str()) {
                return Err(BusError::argument(
                    "subscription",
                    format!("topic '{}' is not declared", subscription.topic),
                ));
            }
            if !queue_names.contains(subscription.queue.as_str()) {
                return Err(BusError::argument(
                    "subscription",
                    format!("queue '{}' is not declared", subscription.queue),
                ));
            }
            if !seen.insert(subscription) {
                return Err(BusError::argument(
                    "subscription",
                    format!("{} -> {} is declared twice", subscription.topic, subscription.queue),
                ));
            }
        }

        Ok(Arc::new(BrokerTopology {
            topics: self.topics,
            queues: self.queues,
            subscriptions: self.subscriptions,
        }))
    }
}

fn unique_names<'a>(
    argument: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<HashSet<&'a str>, BusError> {
    let mut unique = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(BusError::argument(argument, "name must not be empty"));
        }
        if !unique.insert(name) {
            return Err(BusError::argument(argument, format!("'{name}' is declared twice")));
        }
    }
    Ok(unique)
}
