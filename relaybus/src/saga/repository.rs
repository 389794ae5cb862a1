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

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;
use uuid::Uuid;

use crate::common::{KeyedGuard, KeyedLock};
use crate::saga::SagaInstance;

/// Errors a saga repository reports.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Storage of saga instances.
///
/// `lock` grants exclusive use of one correlation id; the runtime holds the
/// guard from `load` until the resulting `save` or `delete` returns, so two
/// transitions for the same id never overlap. `delete` of an absent id
/// succeeds.
#[async_trait]
pub trait SagaRepository<I>: Send + Sync {
    async fn lock(&self, correlation_id: Uuid) -> Result<KeyedGuard, RepositoryError>;

    async fn load(&self, correlation_id: Uuid) -> Result<Option<I>, RepositoryError>;

    async fn save(&self, instance: &I) -> Result<(), RepositoryError>;

    async fn delete(&self, correlation_id: Uuid) -> Result<(), RepositoryError>;

    /// Correlation ids of the instances matching `filter`.
    async fn query(
        &self,
        filter: &(dyn for<'x> Fn(&'x I) -> bool + Send + Sync),
    ) -> Result<Vec<Uuid>, RepositoryError>;
}

/// A saga repository kept in memory, locking through a [`KeyedLock`].
pub struct InMemorySagaRepository<I> {
    instances: DashMap<Uuid, I>,
    locks: KeyedLock<Uuid>,
    fail_saves: AtomicBool,
}

impl<I> fmt::Debug for InMemorySagaRepository<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySagaRepository")
            .field("instances", &self.instances.len())
            .field("locks", &self.locks)
            .finish()
    }
}

impl<I: SagaInstance> Default for InMemorySagaRepository<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: SagaInstance> InMemorySagaRepository<I> {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            locks: KeyedLock::new(),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// A copy of the stored instance.
    pub fn get(&self, correlation_id: Uuid) -> Option<I> {
        self.instances
            .get(&correlation_id)
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, correlation_id: Uuid) -> bool {
        self.instances.contains_key(&correlation_id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Correlation ids currently locked or waited for.
    pub fn locked_keys(&self) -> usize {
        self.locks.len()
    }

    /// Stores `instance` directly, bypassing any transition.
    pub fn insert(&self, instance: I) {
        self.instances.insert(instance.correlation_id(), instance);
    }

    /// Makes every following `save` fail until reset.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<I: SagaInstance> SagaRepository<I> for InMemorySagaRepository<I> {
    async fn lock(&self, correlation_id: Uuid) -> Result<KeyedGuard, RepositoryError> {
        Ok(self.locks.lock(correlation_id).await)
    }

    async fn load(&self, correlation_id: Uuid) -> Result<Option<I>, RepositoryError> {
        Ok(self.get(correlation_id))
    }

    async fn save(&self, instance: &I) -> Result<(), RepositoryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("saves are disabled").into());
        }
        trace!(correlation_id = %instance.correlation_id(), state = instance.current_state(), "Saving saga instance");
        self.instances
            .insert(instance.correlation_id(), instance.clone());
        Ok(())
    }

    async fn delete(&self, correlation_id: Uuid) -> Result<(), RepositoryError> {
        self.instances.remove(&correlation_id);
        self.locks.prune();
        Ok(())
    }

    async fn query(
        &self,
        filter: &(dyn for<'x> Fn(&'x I) -> bool + Send + Sync),
    ) -> Result<Vec<Uuid>, RepositoryError> {
        Ok(self
            .instances
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| *entry.key())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[crate::saga_instance]
    struct Ticket {
        correlation_id: Uuid,
        current_state: String,
        seats: u32,
    }

    #[tokio::test]
    async fn delete_is_idempotent() -> anyhow::Result<()> {
        let repository = InMemorySagaRepository::<Ticket>::new();
        let id = Uuid::new_v4();
        repository.save(&Ticket::new(id)).await?;

        repository.delete(id).await?;
        repository.delete(id).await?;
        assert!(!repository.contains(id));
        Ok(())
    }

    #[tokio::test]
    async fn query_returns_matching_ids() -> anyhow::Result<()> {
        let repository = InMemorySagaRepository::<Ticket>::new();
        let mut large = Ticket::new(Uuid::new_v4());
        large.seats = 4;
        repository.insert(large.clone());
        repository.insert(Ticket::new(Uuid::new_v4()));

        let ids = repository.query(&|ticket: &Ticket| ticket.seats > 2).await?;
        assert_eq!(ids, vec![large.correlation_id]);
        Ok(())
    }

    #[tokio::test]
    async fn failing_saves_leave_the_store_untouched() {
        let repository = InMemorySagaRepository::<Ticket>::new();
        repository.fail_saves(true);
        let result = repository.save(&Ticket::new(Uuid::new_v4())).await;
        assert!(result.is_err());
        assert!(repository.is_empty());
    }
}
