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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::common::{ActorHandle, ActorKey, CourierError, StopOutcome};
use crate::traits::Stoppable;

/// How a pool picks the member that receives the next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Members in order, wrapping around.
    #[default]
    RoundRobin,
    /// A uniformly random member.
    Random,
}

impl RoutingStrategy {
    fn select(self, cursor: &AtomicUsize, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        match self {
            Self::RoundRobin => Some(cursor.fetch_add(1, Ordering::Relaxed) % len),
            Self::Random => Some(rand::rng().random_range(0..len)),
        }
    }
}

/// Spawns the pool member with the given index.
pub(crate) type Spawner<M> = Arc<dyn Fn(usize) -> Option<ActorHandle<M>> + Send + Sync>;

/// A pool of identical actors behind one address.
pub struct PoolRouter<M> {
    inner: Arc<PoolInner<M>>,
}

struct PoolInner<M> {
    key: ActorKey,
    routees: RwLock<Vec<ActorHandle<M>>>,
    cursor: AtomicUsize,
    next_member: AtomicUsize,
    strategy: RoutingStrategy,
    upper_bound: usize,
    spawner: Spawner<M>,
}

impl<M> Clone for PoolRouter<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M> fmt::Debug for PoolRouter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRouter")
            .field("key", &self.inner.key)
            .field("size", &self.inner.routees.read().len())
            .field("upper_bound", &self.inner.upper_bound)
            .field("strategy", &self.inner.strategy)
            .finish()
    }
}

impl<M: Send + 'static> PoolRouter<M> {
    pub(crate) fn new(
        key: ActorKey,
        strategy: RoutingStrategy,
        upper_bound: usize,
        instance_count: usize,
        spawner: Spawner<M>,
    ) -> Self {
        let router = Self {
            inner: Arc::new(PoolInner {
                key,
                routees: RwLock::new(Vec::with_capacity(instance_count)),
                cursor: AtomicUsize::new(0),
                next_member: AtomicUsize::new(0),
                strategy,
                upper_bound,
                spawner,
            }),
        };
        router.grow_to(instance_count);
        router
    }

    /// The pool identity.
    #[must_use]
    pub fn key(&self) -> &ActorKey {
        &self.inner.key
    }

    /// Current number of members.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.routees.read().len()
    }

    /// Largest size the pool may reach.
    #[must_use]
    pub fn upper_bound(&self) -> usize {
        self.inner.upper_bound
    }

    /// Snapshot of the current members, in routing order.
    #[must_use]
    pub fn routees(&self) -> Vec<ActorHandle<M>> {
        self.inner.routees.read().clone()
    }

    /// Forwards a message to the next member.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::MailboxClosed`] when the pool is empty or the
    /// selected member has stopped.
    pub fn try_send(&self, message: M) -> Result<(), CourierError> {
        let routees = self.inner.routees.read();
        let Some(index) = self.inner.strategy.select(&self.inner.cursor, routees.len()) else {
            return Err(CourierError::MailboxClosed(self.inner.key.clone()));
        };
        routees[index].try_send(message)
    }

    /// Forwards a message to the next member, logging failures.
    pub fn send(&self, message: M) {
        if let Err(err) = self.try_send(message) {
            warn!(pool = %self.inner.key, "dropping message: {err}");
        }
    }

    /// Grows or shrinks the pool to `target` members.
    ///
    /// Removed members are stopped gracefully within `stop_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::InvalidRegistration`] when `target` is zero or
    /// above the upper bound.
    pub async fn resize(&self, target: usize, stop_timeout: Duration) -> Result<(), CourierError> {
        if target == 0 || target > self.inner.upper_bound {
            return Err(CourierError::InvalidRegistration(format!(
                "pool {} can be resized to 1..={} members, not {target}",
                self.inner.key, self.inner.upper_bound
            )));
        }
        self.grow_to(target);
        let removed = {
            let mut routees = self.inner.routees.write();
            if routees.len() > target {
                routees.split_off(target)
            } else {
                Vec::new()
            }
        };
        if !removed.is_empty() {
            trace!(pool = %self.inner.key, removed = removed.len(), "shrinking pool");
            join_all(removed.iter().map(|member| member.stop(stop_timeout))).await;
        }
        Ok(())
    }

    /// Stops every member, returning the worst outcome.
    pub async fn stop(&self, timeout: Duration) -> StopOutcome {
        let members = self.routees();
        let outcomes = join_all(members.iter().map(|member| member.stop(timeout))).await;
        if outcomes.iter().any(|outcome| *outcome == StopOutcome::Forced) {
            StopOutcome::Forced
        } else if outcomes.iter().all(|outcome| *outcome == StopOutcome::AlreadyStopped) {
            StopOutcome::AlreadyStopped
        } else {
            StopOutcome::Graceful
        }
    }

    fn grow_to(&self, target: usize) {
        let mut routees = self.inner.routees.write();
        while routees.len() < target.min(self.inner.upper_bound) {
            let index = self.inner.next_member.fetch_add(1, Ordering::Relaxed);
            match (self.inner.spawner)(index) {
                Some(member) => routees.push(member),
                None => {
                    warn!(pool = %self.inner.key, "runtime is gone, cannot add pool members");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl<M: Send + 'static> Stoppable for PoolRouter<M> {
    fn key(&self) -> &ActorKey {
        &self.inner.key
    }

    async fn stop_within(&self, timeout: Duration) -> StopOutcome {
        self.stop(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_in_order() {
        let cursor = AtomicUsize::new(0);
        let picks: Vec<_> = (0..7)
            .filter_map(|_| RoutingStrategy::RoundRobin.select(&cursor, 3))
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn random_stays_in_range() {
        let cursor = AtomicUsize::new(0);
        for _ in 0..100 {
            let pick = RoutingStrategy::Random.select(&cursor, 4).expect("non-empty");
            assert!(pick < 4);
        }
    }

    #[test]
    fn empty_pool_selects_nothing() {
        let cursor = AtomicUsize::new(0);
        assert_eq!(RoutingStrategy::RoundRobin.select(&cursor, 0), None);
        assert_eq!(RoutingStrategy::Random.select(&cursor, 0), None);
    }
}
