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
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, trace};

use crate::actor::{ActorConfig, ActorContext, ManagedActor, Supervisor, SupervisorPolicy};
use crate::common::config::CourierConfig;
use crate::common::router::Spawner;
use crate::common::{
    ActorFactory, ActorHandle, ActorKey, ActorRef, ActorRegistration, ActorRegistry, CourierError,
    PoolRouter, RegistrationMode, RoutingStrategy, ShutdownSummary, StopOutcome,
};
use crate::traits::Actor;

/// The running actor system.
///
/// Cloning is cheap; every clone refers to the same registry, configuration,
/// and root cancellation token. Components receive the runtime explicitly, so
/// separate runtimes (one per test, for example) are fully isolated.
#[derive(Clone)]
pub struct ActorRuntime(pub(crate) Arc<RuntimeInner>);

pub(crate) struct RuntimeInner {
    pub(crate) cancellation_token: CancellationToken,
    pub(crate) registry: ActorRegistry,
    pub(crate) config: CourierConfig,
    termination_cause: Mutex<Option<CourierError>>,
}

impl fmt::Debug for ActorRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRuntime")
            .field("registry", &self.0.registry)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl ActorRuntime {
    pub(crate) fn new(config: CourierConfig) -> Self {
        Self(Arc::new(RuntimeInner {
            cancellation_token: CancellationToken::new(),
            registry: ActorRegistry::new(),
            config,
            termination_cause: Mutex::new(None),
        }))
    }

    /// The runtime configuration.
    #[must_use]
    pub fn config(&self) -> &CourierConfig {
        &self.0.config
    }

    /// The registry of named actors.
    #[must_use]
    pub fn registry(&self) -> &ActorRegistry {
        &self.0.registry
    }

    /// Spawns an unregistered actor.
    ///
    /// The caller owns the returned handle. A `Restart` directive has no factory
    /// to rebuild from and behaves like `Resume`.
    pub fn spawn_actor<A: Actor>(
        &self,
        config: ActorConfig,
        actor: A,
    ) -> ActorHandle<A::Message> {
        self.launch(&config, actor, None)
    }

    /// Spawns an unregistered actor that can be rebuilt on `Restart`.
    pub fn spawn_actor_with_factory<A, F>(
        &self,
        config: ActorConfig,
        factory: F,
    ) -> ActorHandle<A::Message>
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let factory: ActorFactory<A> = Arc::new(factory);
        self.launch(&config, factory(), Some(factory))
    }

    /// Registers an actor kind under `(kind, name)` and spawns its instances.
    ///
    /// # Errors
    ///
    /// * [`CourierError::InvalidRegistration`] when the registration violates
    ///   the pool invariants.
    /// * [`CourierError::RegistrationConflict`] when the key is taken. The
    ///   existing registration is left intact and nothing is spawned.
    #[instrument(skip(self, registration, factory))]
    pub fn register<A, F>(
        &self,
        kind: &str,
        name: &str,
        registration: ActorRegistration,
        factory: F,
    ) -> Result<ActorRef<A::Message>, CourierError>
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        registration.validate()?;
        let key = ActorKey::new(kind, name);
        let config = registration.actor_config(key.clone());
        let factory: ActorFactory<A> = Arc::new(factory);
        self.0.registry.insert_with(key, || match registration.mode() {
            RegistrationMode::Singleton => {
                ActorRef::Single(self.launch(&config, factory(), Some(factory.clone())))
            }
            RegistrationMode::Pooled {
                instance_count,
                upper_bound,
                strategy,
            } => ActorRef::Pooled(self.pool(
                &config,
                *instance_count,
                *upper_bound,
                *strategy,
                factory.clone(),
            )),
        })
    }

    /// Looks up a registered actor.
    ///
    /// # Errors
    ///
    /// [`CourierError::NotFound`] or [`CourierError::TypeMismatch`].
    pub fn resolve<M: Send + 'static>(
        &self,
        kind: &str,
        name: &str,
    ) -> Result<ActorRef<M>, CourierError> {
        self.0.registry.resolve(&ActorKey::new(kind, name))
    }

    /// Removes a registration and stops it.
    ///
    /// # Errors
    ///
    /// [`CourierError::NotFound`] when nothing is registered under the key.
    pub async fn unregister(&self, kind: &str, name: &str) -> Result<StopOutcome, CourierError> {
        let key = ActorKey::new(kind, name);
        let stopper = self
            .0
            .registry
            .remove(&key)
            .ok_or_else(|| CourierError::not_found(&key))?;
        Ok(stopper.stop_within(self.0.config.actor_stop_timeout()).await)
    }

    /// Stops every registered actor within the configured system shutdown
    /// timeout, then cancels whatever is still running.
    pub async fn shutdown_all(&self) -> ShutdownSummary {
        self.shutdown_within(self.0.config.system_shutdown_timeout())
            .await
    }

    /// Stops every registered actor, giving each `grace` to drain, then cancels
    /// the root token so unregistered actors and timers exit too.
    ///
    /// Timeouts are logged once, in aggregate.
    #[instrument(skip(self))]
    pub async fn shutdown_within(&self, grace: Duration) -> ShutdownSummary {
        let stoppers = self.0.registry.stoppers();
        trace!(count = stoppers.len(), "stopping registered actors");
        let results = join_all(stoppers.iter().map(|stopper| async move {
            (stopper.key().clone(), stopper.stop_within(grace).await)
        }))
        .await;

        let mut summary = ShutdownSummary::default();
        for (key, outcome) in results {
            summary.record(key, outcome);
        }
        if !summary.is_clean() {
            let forced: Vec<String> = summary.forced.iter().map(ToString::to_string).collect();
            error!(
                grace_ms = grace.as_millis(),
                "{} actor(s) had to be cancelled during shutdown: {}",
                forced.len(),
                forced.join(", ")
            );
        }
        self.0.cancellation_token.cancel();
        trace!("runtime shut down");
        summary
    }

    /// Shuts the runtime down after a critical failure, within the configured
    /// critical grace period.
    pub async fn terminate(&self) {
        if self.is_terminated() {
            return;
        }
        let grace = self.0.config.critical_termination_grace();
        error!(grace_ms = grace.as_millis(), "terminating runtime");
        self.shutdown_within(grace).await;
    }

    /// Whether the runtime has been shut down.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.0.cancellation_token.is_cancelled()
    }

    /// Completes once the runtime has been shut down.
    pub async fn terminated(&self) {
        self.0.cancellation_token.cancelled().await;
    }

    /// Takes the failure that made a critical actor terminate the runtime.
    ///
    /// Only the first cause is kept. Returns `None` after a regular shutdown.
    pub fn take_termination_cause(&self) -> Option<CourierError> {
        self.0.termination_cause.lock().take()
    }

    pub(crate) fn record_termination_cause(&self, cause: CourierError) {
        let mut slot = self.0.termination_cause.lock();
        if slot.is_none() {
            *slot = Some(cause);
        }
    }

    fn launch<A: Actor>(
        &self,
        config: &ActorConfig,
        actor: A,
        factory: Option<ActorFactory<A>>,
    ) -> ActorHandle<A::Message> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let handle = ActorHandle::new(
            config.key().clone(),
            outbox,
            self.0.cancellation_token.child_token(),
        );
        let policy = config
            .policy()
            .cloned()
            .unwrap_or_else(|| SupervisorPolicy::new(self.0.config.supervision.clone()));
        let ctx = ActorContext::new(handle.clone(), self.clone());
        let managed = ManagedActor::new(
            actor,
            ctx,
            inbox,
            Supervisor::new(policy),
            factory,
            config.is_critical(),
        );
        handle.tracker.spawn(managed.wake());
        handle.tracker.close();
        trace!(actor = %config.key(), "actor spawned");
        handle
    }

    fn pool<A: Actor>(
        &self,
        config: &ActorConfig,
        instance_count: usize,
        upper_bound: usize,
        strategy: RoutingStrategy,
        factory: ActorFactory<A>,
    ) -> PoolRouter<A::Message> {
        let runtime = Arc::downgrade(&self.0);
        let template = config.clone();
        let spawner: Spawner<A::Message> = Arc::new(move |index| {
            let runtime = ActorRuntime(runtime.upgrade()?);
            let member = template.with_key(template.key().member(index));
            Some(runtime.launch(&member, factory(), Some(factory.clone())))
        });
        PoolRouter::new(config.key().clone(), strategy, upper_bound, instance_count, spawner)
    }
}
