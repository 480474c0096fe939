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

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{trace, warn};

use crate::actor::{ActorConfig, SupervisorPolicy};
use crate::common::{ActorHandle, ActorKey, CourierError, PoolRouter, RoutingStrategy, StopOutcome};
use crate::message::Recipient;
use crate::traits::Stoppable;

/// Whether a registration creates one actor or a routed pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationMode {
    /// Exactly one actor.
    Singleton,
    /// `instance_count` actors behind a router that may grow to `upper_bound`.
    Pooled {
        /// Members created at registration.
        instance_count: usize,
        /// Largest size the pool may be resized to.
        upper_bound: usize,
        /// Member selection.
        strategy: RoutingStrategy,
    },
}

/// A request to register an actor kind under a name.
#[derive(Debug, Clone)]
pub struct ActorRegistration {
    mode: RegistrationMode,
    policy: Option<SupervisorPolicy>,
    critical: bool,
}

impl ActorRegistration {
    /// One actor.
    #[must_use]
    pub const fn singleton() -> Self {
        Self {
            mode: RegistrationMode::Singleton,
            policy: None,
            critical: false,
        }
    }

    /// A round-robin pool. `instance_count` must be below `upper_bound`.
    #[must_use]
    pub const fn pooled(instance_count: usize, upper_bound: usize) -> Self {
        Self {
            mode: RegistrationMode::Pooled {
                instance_count,
                upper_bound,
                strategy: RoutingStrategy::RoundRobin,
            },
            policy: None,
            critical: false,
        }
    }

    /// Changes member selection for a pooled registration.
    #[must_use]
    pub fn with_strategy(mut self, routing: RoutingStrategy) -> Self {
        if let RegistrationMode::Pooled { strategy, .. } = &mut self.mode {
            *strategy = routing;
        }
        self
    }

    /// Supervision policy applied to every instance.
    #[must_use]
    pub fn with_policy(mut self, policy: SupervisorPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Marks every instance as critical to the process.
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// The registration mode.
    #[must_use]
    pub const fn mode(&self) -> &RegistrationMode {
        &self.mode
    }

    /// Checks the pool invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::InvalidRegistration`] for an empty pool or one
    /// whose instance count is not below its upper bound.
    pub fn validate(&self) -> Result<(), CourierError> {
        match self.mode {
            RegistrationMode::Singleton => Ok(()),
            RegistrationMode::Pooled {
                instance_count,
                upper_bound,
                ..
            } => {
                if instance_count == 0 {
                    Err(CourierError::InvalidRegistration(
                        "a pool needs at least one instance".to_string(),
                    ))
                } else if instance_count >= upper_bound {
                    Err(CourierError::InvalidRegistration(format!(
                        "instance count {instance_count} must be below the upper bound \
                         {upper_bound}"
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }

    pub(crate) fn actor_config(&self, key: ActorKey) -> ActorConfig {
        let mut config = ActorConfig::new(key);
        if let Some(policy) = &self.policy {
            config = config.with_policy(policy.clone());
        }
        if self.critical {
            config = config.critical();
        }
        config
    }
}

/// Address handed out by the registry.
pub enum ActorRef<M> {
    /// A singleton registration.
    Single(ActorHandle<M>),
    /// A pooled registration.
    Pooled(PoolRouter<M>),
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Single(handle) => Self::Single(handle.clone()),
            Self::Pooled(pool) => Self::Pooled(pool.clone()),
        }
    }
}

impl<M> fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(handle) => f.debug_tuple("Single").field(handle).finish(),
            Self::Pooled(pool) => f.debug_tuple("Pooled").field(pool).finish(),
        }
    }
}

impl<M: Send + 'static> ActorRef<M> {
    /// The registered key.
    #[must_use]
    pub fn key(&self) -> &ActorKey {
        match self {
            Self::Single(handle) => handle.key(),
            Self::Pooled(pool) => pool.key(),
        }
    }

    /// Sends a message, routing through the pool if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::MailboxClosed`] when the target no longer accepts messages.
    pub fn try_send(&self, message: M) -> Result<(), CourierError> {
        match self {
            Self::Single(handle) => handle.try_send(message),
            Self::Pooled(pool) => pool.try_send(message),
        }
    }

    /// Sends a message; failures are logged.
    pub fn send(&self, message: M) {
        match self {
            Self::Single(handle) => handle.send(message),
            Self::Pooled(pool) => pool.send(message),
        }
    }

    /// A typed address for any message convertible into `M`.
    pub fn recipient<T>(&self) -> Recipient<T>
    where
        T: Send + 'static,
        M: From<T>,
    {
        match self {
            Self::Single(handle) => handle.recipient(),
            Self::Pooled(pool) => {
                let pool = pool.clone();
                Recipient::from_fn(pool.key().to_string(), move |message: T| {
                    pool.try_send(M::from(message))
                })
            }
        }
    }

    /// Stops the actor or every pool member.
    pub async fn stop(&self, timeout: Duration) -> StopOutcome {
        match self {
            Self::Single(handle) => handle.stop(timeout).await,
            Self::Pooled(pool) => pool.stop(timeout).await,
        }
    }

    /// The single handle, if this is a singleton.
    #[must_use]
    pub const fn as_handle(&self) -> Option<&ActorHandle<M>> {
        match self {
            Self::Single(handle) => Some(handle),
            Self::Pooled(_) => None,
        }
    }

    /// The router, if this is a pool.
    #[must_use]
    pub const fn as_pool(&self) -> Option<&PoolRouter<M>> {
        match self {
            Self::Single(_) => None,
            Self::Pooled(pool) => Some(pool),
        }
    }
}

#[async_trait]
impl<M: Send + 'static> Stoppable for ActorRef<M> {
    fn key(&self) -> &ActorKey {
        ActorRef::key(self)
    }

    async fn stop_within(&self, timeout: Duration) -> StopOutcome {
        self.stop(timeout).await
    }
}

struct RegistryEntry {
    address: Box<dyn Any + Send + Sync>,
    stopper: Arc<dyn Stoppable>,
    message_type: &'static str,
}

/// Table of registered actors keyed by `(kind, name)`.
///
/// Each [`ActorRuntime`](crate::common::ActorRuntime) owns its own registry,
/// so independent runtimes never see each other's registrations.
#[derive(Default)]
pub struct ActorRegistry {
    entries: DashMap<ActorKey, RegistryEntry>,
}

impl fmt::Debug for ActorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl ActorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the address built by `build` unless `key` is taken.
    ///
    /// `build` only runs when the key is free, so a rejected registration never
    /// spawns anything and leaves the existing entry untouched.
    pub(crate) fn insert_with<M, F>(
        &self,
        key: ActorKey,
        build: F,
    ) -> Result<ActorRef<M>, CourierError>
    where
        M: Send + 'static,
        F: FnOnce() -> ActorRef<M>,
    {
        match self.entries.entry(key) {
            Entry::Occupied(occupied) => {
                warn!(actor = %occupied.key(), "duplicate registration rejected");
                Err(CourierError::conflict(occupied.key()))
            }
            Entry::Vacant(vacant) => {
                let address = build();
                trace!(actor = %vacant.key(), "registered");
                vacant.insert(RegistryEntry {
                    address: Box::new(address.clone()),
                    stopper: Arc::new(address.clone()),
                    message_type: type_name::<M>(),
                });
                Ok(address)
            }
        }
    }

    /// Looks up a registration.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::NotFound`] for an unknown key and
    /// [`CourierError::TypeMismatch`] when the actor accepts another message type.
    pub fn resolve<M: Send + 'static>(&self, key: &ActorKey) -> Result<ActorRef<M>, CourierError> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| CourierError::not_found(key))?;
        entry
            .address
            .downcast_ref::<ActorRef<M>>()
            .cloned()
            .ok_or_else(|| CourierError::TypeMismatch {
                key: key.clone(),
                expected: type_name::<M>(),
                actual: entry.message_type,
            })
    }

    /// Removes a registration, returning its stop capability.
    pub fn remove(&self, key: &ActorKey) -> Option<Arc<dyn Stoppable>> {
        self.entries.remove(key).map(|(_, entry)| entry.stopper)
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &ActorKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<ActorKey> {
        let mut keys: Vec<_> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn stoppers(&self) -> Vec<Arc<dyn Stoppable>> {
        self.entries
            .iter()
            .map(|entry| entry.value().stopper.clone())
            .collect()
    }
}
