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

use std::any::{Any, TypeId};
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::common::BusError;

type SetupResult<P> = Result<Arc<P>, Arc<BusError>>;

/// Slot holding the shared outcome of one `one_time_setup::<P>` per scope.
struct OneTimeSetup<P> {
    outcome: OnceCell<SetupResult<P>>,
}

/// A type-keyed bag of payloads attached to a context.
///
/// Filters use it to share state along a chain and to memoize one-time setup.
/// Each payload type is stored at most once; it is replaced only through the
/// explicit [`PayloadCache::replace`] and [`PayloadCache::add_or_update`] calls.
///
/// Lookups are typed: the `TypeId` of `P` is the key and the stored value is
/// always an `Arc<P>`, so the downcast in the accessors cannot fail.
///
/// Factories run while the entry for their type is held. They must not touch
/// the same cache.
#[derive(Default)]
pub struct PayloadCache {
    payloads: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Debug for PayloadCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadCache")
            .field("payloads", &self.payloads.len())
            .finish()
    }
}

impl PayloadCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payload of type `P`, if present.
    #[must_use]
    pub fn get<P: Send + Sync + 'static>(&self) -> Option<Arc<P>> {
        self.payloads
            .get(&TypeId::of::<P>())
            .and_then(|entry| Arc::clone(entry.value()).downcast::<P>().ok())
    }

    /// Returns `true` if a payload of type `P` is present.
    #[must_use]
    pub fn contains<P: Send + Sync + 'static>(&self) -> bool {
        self.payloads.contains_key(&TypeId::of::<P>())
    }

    /// Returns the payload of type `P`, adding the one built by `factory` if absent.
    ///
    /// The check and the insert are a single atomic step: concurrent callers
    /// all observe the same instance and `factory` runs at most once.
    pub fn get_or_add<P, F>(&self, factory: F) -> Arc<P>
    where
        P: Send + Sync + 'static,
        F: FnOnce() -> P,
    {
        let entry = self
            .payloads
            .entry(TypeId::of::<P>())
            .or_insert_with(|| Arc::new(factory()) as Arc<dyn Any + Send + Sync>);
        Self::downcast(entry.value())
    }

    /// Adds `payload` if no payload of type `P` exists. Returns `false` and
    /// leaves the existing payload in place otherwise.
    pub fn try_add<P: Send + Sync + 'static>(&self, payload: P) -> bool {
        let mut added = false;
        self.payloads.entry(TypeId::of::<P>()).or_insert_with(|| {
            added = true;
            Arc::new(payload)
        });
        added
    }

    /// Adds the payload built by `add`, or replaces the existing one with the
    /// result of `update`. Returns the payload now stored.
    pub fn add_or_update<P, A, U>(&self, add: A, update: U) -> Arc<P>
    where
        P: Send + Sync + 'static,
        A: FnOnce() -> P,
        U: FnOnce(&P) -> P,
    {
        let mut added = false;
        let mut entry = self.payloads.entry(TypeId::of::<P>()).or_insert_with(|| {
            added = true;
            Arc::new(add()) as Arc<dyn Any + Send + Sync>
        });
        let existing: Arc<P> = Self::downcast(entry.value());
        if added {
            return existing;
        }
        let updated = Arc::new(update(&existing));
        *entry.value_mut() = Arc::clone(&updated) as Arc<dyn Any + Send + Sync>;
        updated
    }

    /// Replaces the payload of type `P`, returning the previous one.
    pub fn replace<P: Send + Sync + 'static>(&self, payload: P) -> Option<Arc<P>> {
        self.payloads
            .insert(TypeId::of::<P>(), Arc::new(payload))
            .and_then(|previous| previous.downcast::<P>().ok())
    }

    /// Removes the payload of type `P`.
    pub fn remove<P: Send + Sync + 'static>(&self) -> Option<Arc<P>> {
        self.payloads
            .remove(&TypeId::of::<P>())
            .and_then(|(_, previous)| previous.downcast::<P>().ok())
    }

    /// Number of payloads stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Returns `true` when the cache holds no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Runs `setup` exactly once per cache for payload type `P`.
    ///
    /// The first caller builds the payload with `factory` and awaits `setup`;
    /// concurrent callers await the same in-flight attempt and every later
    /// caller receives the stored outcome. On success the payload is also
    /// added to the cache, so `contains::<P>()` reports completed setups.
    ///
    /// A failure, including cancellation through `cancellation`, is cached
    /// and re-surfaced as [`BusError::SetupFailure`] until
    /// [`PayloadCache::reset_one_time_setup`] is called. Nothing retries
    /// automatically.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SetupFailure`] wrapping the cached cause.
    pub async fn one_time_setup<P, S, Fut, F>(
        &self,
        scope: &str,
        cancellation: &CancellationToken,
        setup: S,
        factory: F,
    ) -> Result<Arc<P>, BusError>
    where
        P: Send + Sync + 'static,
        S: FnOnce(Arc<P>) -> Fut,
        Fut: Future<Output = Result<(), BusError>>,
        F: FnOnce() -> P,
    {
        let slot = self.get_or_add(|| OneTimeSetup::<P> {
            outcome: OnceCell::new(),
        });
        let payload_name = std::any::type_name::<P>();

        let outcome = slot
            .outcome
            .get_or_init(|| async {
                debug!(scope, payload = payload_name, "Running one-time setup");
                let payload = Arc::new(factory());
                let result = tokio::select! {
                    biased;
                    () = cancellation.cancelled() => Err(BusError::cancelled(format!("one-time setup {payload_name}"))),
                    result = setup(Arc::clone(&payload)) => result,
                };
                match result {
                    Ok(()) => {
                        self.payloads.insert(
                            TypeId::of::<P>(),
                            Arc::clone(&payload) as Arc<dyn Any + Send + Sync>,
                        );
                        Ok(payload)
                    }
                    Err(error) => {
                        warn!(scope, payload = payload_name, %error, "One-time setup failed");
                        Err(Arc::new(error))
                    }
                }
            })
            .await;

        match outcome {
            Ok(payload) => {
                trace!(scope, payload = payload_name, "One-time setup already complete");
                Ok(Arc::clone(payload))
            }
            Err(cause) => Err(BusError::SetupFailure {
                scope: scope.to_string(),
                payload: payload_name,
                source: Arc::clone(cause),
            }),
        }
    }

    /// Forgets the outcome of `one_time_setup::<P>` so the next call runs the
    /// setup again. Used on scope teardown.
    pub fn reset_one_time_setup<P: Send + Sync + 'static>(&self) {
        self.remove::<OneTimeSetup<P>>();
        self.remove::<P>();
    }

    fn downcast<P: Send + Sync + 'static>(value: &Arc<dyn Any + Send + Sync>) -> Arc<P> {
        match Arc::clone(value).downcast::<P>() {
            Ok(payload) => payload,
            Err(_) => unreachable!("payloads are keyed by their own TypeId"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Attempts(u32);

    #[test]
    fn try_add_keeps_the_first_payload() {
        let cache = PayloadCache::new();
        assert!(cache.try_add(Attempts(1)));
        assert!(!cache.try_add(Attempts(2)));
        assert_eq!(cache.get::<Attempts>().as_deref(), Some(&Attempts(1)));
    }

    #[test]
    fn add_or_update_adds_then_updates() {
        let cache = PayloadCache::new();
        let added = cache.add_or_update(|| Attempts(1), |a| Attempts(a.0 + 1));
        let updated = cache.add_or_update(|| Attempts(1), |a| Attempts(a.0 + 1));

        assert_eq!(*added, Attempts(1));
        assert_eq!(*updated, Attempts(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replace_and_remove_return_the_previous_payload() {
        let cache = PayloadCache::new();
        assert!(cache.replace(Attempts(1)).is_none());
        assert_eq!(cache.replace(Attempts(5)).as_deref(), Some(&Attempts(1)));
        assert_eq!(cache.remove::<Attempts>().as_deref(), Some(&Attempts(5)));
        assert!(cache.is_empty());
    }
}
