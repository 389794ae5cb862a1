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
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// A keyed mutex service: at most one holder per key at a time.
///
/// Saga repositories use it to serialize transitions for the same correlation
/// id while leaving unrelated keys free to progress. A key is tracked only
/// while someone holds or waits for it.
pub struct KeyedLock<K> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

/// Exclusive access to one key of a [`KeyedLock`]; released on drop.
pub struct KeyedGuard {
    guard: Option<OwnedMutexGuard<()>>,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Debug for KeyedGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedGuard")
            .field("held", &self.guard.is_some())
            .finish()
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // The mutex must be unlocked before its entry is considered for removal.
        drop(self.guard.take());
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl<K> KeyedLock<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Creates an empty lock service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Waits until `key` is free and returns a guard holding it.
    pub async fn lock(&self, key: K) -> KeyedGuard {
        // The map entry must be released before awaiting the mutex.
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        trace!(?key, "Waiting for keyed lock");
        let guard = mutex.lock_owned().await;
        self.guard(key, guard)
    }

    /// Returns a guard if `key` is free right now.
    pub fn try_lock(&self, key: K) -> Option<KeyedGuard> {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        match mutex.try_lock_owned() {
            Ok(guard) => Some(self.guard(key, guard)),
            Err(_) => {
                Self::forget_if_unused(&self.locks, &key);
                None
            }
        }
    }

    /// Drops entries nobody holds or waits for.
    pub fn prune(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    /// Number of keys currently held or waited for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` when no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn guard(&self, key: K, guard: OwnedMutexGuard<()>) -> KeyedGuard {
        let locks = Arc::clone(&self.locks);
        KeyedGuard {
            guard: Some(guard),
            release: Some(Box::new(move || Self::forget_if_unused(&locks, &key))),
        }
    }

    /// Removes `key` when the table holds the only reference to its mutex.
    /// Waiters clone the mutex under the same shard lock, so they keep it alive.
    fn forget_if_unused(locks: &DashMap<K, Arc<Mutex<()>>>, key: &K) {
        if locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1)
            .is_some()
        {
            trace!(?key, "Keyed lock released");
        }
    }
}

impl<K> Default for KeyedLock<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> Debug for KeyedLock<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLock")
            .field("keys", &self.locks.len())
            .finish()
    }
}
