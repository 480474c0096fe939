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

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::{error, info, instrument, trace, warn};

use crate::actor::{ActorConfig, ActorContext};
use crate::common::config::CourierConfig;
use crate::common::{ActorError, ActorHandle, ActorRuntime, StopOutcome};
use crate::coordination::messages::WorkerMessage;
use crate::coordination::work_context::WorkContext;
use crate::coordination::worker::WorkerActor;
use crate::coordination::{
    CoordinatorMessage, Pong, WorkAbandoned, WorkCompleted, WorkId, WorkTicket, WorkerBehavior,
    WorkerId,
};
use crate::message::Recipient;
use crate::traits::Actor;

/// What to do with a worker that left a ping unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthDecision {
    /// Keep the worker. It will not be pinged again until it answers.
    Keep,
    /// Stop the worker and take it out of the rotation.
    Remove,
}

/// Hooks that customize how a coordinator reacts to results and health events.
pub trait CoordinatorBehavior<O>: Send + 'static {
    /// Called once per completed item, after its context was removed.
    fn on_work_completed(
        &mut self,
        completed: WorkCompleted<O>,
        _respond_to: Option<&Recipient<WorkCompleted<O>>>,
    ) {
        info!(work = %completed.work_id, worker = %completed.worker, "work completed");
    }

    /// Called on a health check when `worker` has not answered its last ping.
    fn on_worker_unresponsive(&mut self, worker: WorkerId) -> HealthDecision {
        warn!(%worker, "worker has not answered its last health check");
        HealthDecision::Keep
    }

    /// Called when a worker dropped an item without completing it, after its
    /// context was removed.
    fn on_work_abandoned(&mut self, work_id: WorkId, worker: WorkerId) {
        warn!(work = %work_id, %worker, "work abandoned by its worker");
    }

    /// Called when an in-flight item exceeded the work timeout and was dropped.
    fn on_work_timeout(&mut self, work_id: WorkId, worker: WorkerId, age: Duration) {
        warn!(work = %work_id, %worker, age_ms = age.as_millis(), "work timed out");
    }
}

/// Logs completions and keeps unresponsive workers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCompletions;

impl<O: Send + 'static> CoordinatorBehavior<O> for LogCompletions {}

/// Forwards each result to the recipient supplied with its work item.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardCompletions;

impl<O: Send + 'static> CoordinatorBehavior<O> for ForwardCompletions {
    fn on_work_completed(
        &mut self,
        completed: WorkCompleted<O>,
        respond_to: Option<&Recipient<WorkCompleted<O>>>,
    ) {
        match respond_to {
            Some(recipient) => recipient.send(completed),
            None => trace!(work = %completed.work_id, "no recipient for completed work"),
        }
    }
}

/// Health-check schedule and timeouts of a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Delay before the first health check.
    pub health_initial_delay: Duration,
    /// Interval between health checks.
    pub health_interval: Duration,
    /// In-flight work older than this is expired on the next health check.
    pub work_timeout: Option<Duration>,
    /// Grace given to each worker when the coordinator stops or removes it.
    pub worker_stop_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&CourierConfig::default())
    }
}

impl CoordinatorSettings {
    /// Settings taken from the runtime configuration.
    #[must_use]
    pub fn from_config(config: &CourierConfig) -> Self {
        Self {
            health_initial_delay: Duration::from_millis(config.health.initial_delay_ms),
            health_interval: Duration::from_millis(config.health.interval_ms),
            work_timeout: config.health.work_timeout_ms.map(Duration::from_millis),
            worker_stop_timeout: config.actor_stop_timeout(),
        }
    }

    /// Overrides the health-check schedule.
    #[must_use]
    pub const fn with_health_check(mut self, initial_delay: Duration, interval: Duration) -> Self {
        self.health_initial_delay = initial_delay;
        self.health_interval = interval;
        self
    }

    /// Expires in-flight work older than `timeout`.
    #[must_use]
    pub const fn with_work_timeout(mut self, timeout: Duration) -> Self {
        self.work_timeout = Some(timeout);
        self
    }

    /// Overrides the worker stop grace.
    #[must_use]
    pub const fn with_worker_stop_timeout(mut self, timeout: Duration) -> Self {
        self.worker_stop_timeout = timeout;
        self
    }
}

/// A snapshot of a coordinator's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStatus {
    /// Workers in the rotation.
    pub workers: usize,
    /// Items distributed and not yet completed, abandoned or expired.
    pub in_flight: usize,
    /// Workers with an unanswered ping.
    pub awaiting_pong: usize,
    /// Pings sent since initialization.
    pub pings_sent: u64,
}

type WorkerFactory<W> = Arc<dyn Fn(WorkerId) -> W + Send + Sync>;

struct WorkerSlot<W: WorkerBehavior> {
    id: WorkerId,
    handle: ActorHandle<WorkerMessage<W::Item, W::Output>>,
}

/// Owns a set of workers and distributes work to them round-robin.
///
/// ```rust,ignore
/// let coordinator = Coordinator::new("resize", 4, |_| Resizer::default(), ForwardCompletions)
///     .spawn(&runtime);
/// coordinator.initialize();
/// coordinator.distribute_work_to(image, results.clone());
/// ```
pub struct Coordinator<W: WorkerBehavior, B> {
    name: String,
    worker_count: usize,
    factory: WorkerFactory<W>,
    behavior: B,
    settings: Option<CoordinatorSettings>,
    workers: Vec<WorkerSlot<W>>,
    cursor: usize,
    next_work_id: u64,
    in_flight: HashMap<WorkId, WorkContext<W::Output>>,
    awaiting_pong: HashSet<WorkerId>,
    pings_sent: u64,
    initialized: bool,
}

impl<W, B> Coordinator<W, B>
where
    W: WorkerBehavior,
    B: CoordinatorBehavior<W::Output>,
{
    /// Describes a coordinator with `worker_count` workers built by `factory`.
    ///
    /// The factory is also used to rebuild a worker's state when its
    /// supervision policy asks for a restart.
    pub fn new<F>(name: impl Into<String>, worker_count: usize, factory: F, behavior: B) -> Self
    where
        F: Fn(WorkerId) -> W + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            worker_count,
            factory: Arc::new(factory),
            behavior,
            settings: None,
            workers: Vec::new(),
            cursor: 0,
            next_work_id: 0,
            in_flight: HashMap::new(),
            awaiting_pong: HashSet::new(),
            pings_sent: 0,
            initialized: false,
        }
    }

    /// Uses explicit settings instead of the runtime configuration.
    #[must_use]
    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Spawns the coordinator. Workers are created on [`CoordinatorHandle::initialize`].
    pub fn spawn(mut self, runtime: &ActorRuntime) -> CoordinatorHandle<W::Item, W::Output> {
        if self.settings.is_none() {
            self.settings = Some(CoordinatorSettings::from_config(runtime.config()));
        }
        let config = ActorConfig::named("coordinator", self.name.clone());
        CoordinatorHandle {
            handle: runtime.spawn_actor(config, self),
        }
    }

    fn settings(&self) -> CoordinatorSettings {
        self.settings.clone().unwrap_or_default()
    }

    fn initialize(&mut self, ctx: &ActorContext<CoordinatorMessage<W::Item, W::Output>>) {
        if self.initialized {
            warn!(coordinator = %self.name, "already initialized");
            return;
        }
        self.initialized = true;
        for index in 0..self.worker_count {
            let id = WorkerId(index);
            let factory = self.factory.clone();
            let config = ActorConfig::named("worker", format!("{}-{index}", self.name));
            let handle = ctx
                .runtime()
                .spawn_actor_with_factory(config, move || WorkerActor::new(id, factory(id)));
            self.workers.push(WorkerSlot { id, handle });
        }
        let settings = self.settings();
        ctx.schedule_repeating(settings.health_initial_delay, settings.health_interval, || {
            CoordinatorMessage::HealthTick
        });
        info!(coordinator = %self.name, workers = self.workers.len(), "coordinator initialized");
    }

    fn distribute(
        &mut self,
        item: W::Item,
        respond_to: Option<Recipient<WorkCompleted<W::Output>>>,
        ctx: &ActorContext<CoordinatorMessage<W::Item, W::Output>>,
    ) {
        if self.workers.is_empty() {
            warn!(coordinator = %self.name, "no workers available, dropping work item");
            return;
        }
        let index = self.cursor % self.workers.len();
        self.cursor = index + 1;
        let slot = &self.workers[index];

        let work_id = WorkId(self.next_work_id);
        self.next_work_id += 1;
        let ticket = WorkTicket::new(
            work_id,
            slot.id,
            ctx.handle().recipient(),
            ctx.handle().recipient(),
        );
        self.in_flight
            .insert(work_id, WorkContext::new(slot.id, respond_to));

        if let Err(err) = slot.handle.try_send(WorkerMessage::Work { item, ticket }) {
            warn!(work = %work_id, worker = %slot.id, "could not hand out work: {err}");
            self.in_flight.remove(&work_id);
            return;
        }
        trace!(work = %work_id, worker = %slot.id, "work distributed");
    }

    fn complete(&mut self, completed: WorkCompleted<W::Output>) {
        match self.in_flight.remove(&completed.work_id) {
            Some(context) => {
                trace!(
                    work = %completed.work_id,
                    elapsed_ms = context.age().as_millis(),
                    "completion matched"
                );
                self.behavior
                    .on_work_completed(completed, context.respond_to.as_ref());
            }
            None => warn!(
                work = %completed.work_id,
                "completion for unknown or expired work, ignoring"
            ),
        }
    }

    fn abandon(&mut self, abandoned: WorkAbandoned) {
        match self.in_flight.remove(&abandoned.work_id) {
            Some(context) => self
                .behavior
                .on_work_abandoned(abandoned.work_id, context.worker),
            None => trace!(work = %abandoned.work_id, "abandoned work was no longer tracked"),
        }
    }

    fn health_check(&mut self, ctx: &ActorContext<CoordinatorMessage<W::Item, W::Output>>) {
        let settings = self.settings();
        if let Some(timeout) = settings.work_timeout {
            let expired: Vec<WorkId> = self
                .in_flight
                .iter()
                .filter(|(_, context)| context.is_expired(timeout))
                .map(|(id, _)| *id)
                .collect();
            for work_id in expired {
                if let Some(context) = self.in_flight.remove(&work_id) {
                    self.behavior
                        .on_work_timeout(work_id, context.worker, context.age());
                }
            }
        }

        let reply_to: Recipient<Pong> = ctx.handle().recipient();
        let mut removals = Vec::new();
        for slot in &self.workers {
            if self.awaiting_pong.contains(&slot.id) {
                if self.behavior.on_worker_unresponsive(slot.id) == HealthDecision::Remove {
                    removals.push(slot.id);
                }
                continue;
            }
            if slot
                .handle
                .try_send(WorkerMessage::Ping {
                    reply_to: reply_to.clone(),
                })
                .is_ok()
            {
                self.awaiting_pong.insert(slot.id);
                self.pings_sent += 1;
            } else {
                warn!(worker = %slot.id, "worker mailbox closed, ping not sent");
            }
        }

        for id in removals {
            self.remove_worker(id, settings.worker_stop_timeout);
        }
    }

    fn remove_worker(&mut self, id: WorkerId, grace: Duration) {
        let Some(position) = self.workers.iter().position(|slot| slot.id == id) else {
            return;
        };
        let slot = self.workers.remove(position);
        self.awaiting_pong.remove(&id);
        if position < self.cursor {
            self.cursor -= 1;
        }
        warn!(coordinator = %self.name, worker = %id, "removing unresponsive worker");
        tokio::spawn(async move {
            slot.handle.stop(grace).await;
        });
    }

    fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            workers: self.workers.len(),
            in_flight: self.in_flight.len(),
            awaiting_pong: self.awaiting_pong.len(),
            pings_sent: self.pings_sent,
        }
    }
}

#[async_trait]
impl<W, B> Actor for Coordinator<W, B>
where
    W: WorkerBehavior,
    B: CoordinatorBehavior<W::Output>,
{
    type Message = CoordinatorMessage<W::Item, W::Output>;

    async fn handle(
        &mut self,
        message: Self::Message,
        ctx: &mut ActorContext<Self::Message>,
    ) -> Result<(), ActorError> {
        match message {
            CoordinatorMessage::Initialize => self.initialize(ctx),
            CoordinatorMessage::Distribute { item, respond_to } => {
                self.distribute(item, respond_to, ctx);
            }
            CoordinatorMessage::Completed(completed) => self.complete(completed),
            CoordinatorMessage::Abandoned(abandoned) => self.abandon(abandoned),
            CoordinatorMessage::HealthTick => self.health_check(ctx),
            CoordinatorMessage::Pong(pong) => {
                trace!(worker = %pong.worker, "pong received");
                self.awaiting_pong.remove(&pong.worker);
            }
            CoordinatorMessage::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
        Ok(())
    }

    async fn stopped(&mut self, _ctx: &mut ActorContext<Self::Message>) {
        let grace = self.settings().worker_stop_timeout;
        let workers = std::mem::take(&mut self.workers);
        let outcomes = join_all(
            workers
                .iter()
                .map(|slot| async move { (slot.id, slot.handle.stop(grace).await) }),
        )
        .await;
        let forced: Vec<String> = outcomes
            .into_iter()
            .filter(|(_, outcome)| *outcome == StopOutcome::Forced)
            .map(|(id, _)| id.to_string())
            .collect();
        if !forced.is_empty() {
            error!(
                coordinator = %self.name,
                grace_ms = grace.as_millis(),
                "{} worker(s) had to be cancelled: {}",
                forced.len(),
                forced.join(", ")
            );
        }
        if !self.in_flight.is_empty() {
            warn!(
                coordinator = %self.name,
                in_flight = self.in_flight.len(),
                "coordinator stopped with work in flight"
            );
        }
    }
}

/// Address of a running coordinator.
pub struct CoordinatorHandle<I: Send + 'static, O: Send + 'static> {
    handle: ActorHandle<CoordinatorMessage<I, O>>,
}

impl<I: Send + 'static, O: Send + 'static> Clone for CoordinatorHandle<I, O> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> CoordinatorHandle<I, O> {
    /// Creates the workers and starts health checking.
    pub fn initialize(&self) {
        self.handle.send(CoordinatorMessage::Initialize);
    }

    /// Distributes an item; the result is only seen by the coordinator behavior.
    pub fn distribute_work(&self, item: I) {
        self.handle.send(CoordinatorMessage::Distribute {
            item,
            respond_to: None,
        });
    }

    /// Distributes an item and names the recipient of its result.
    pub fn distribute_work_to(&self, item: I, respond_to: Recipient<WorkCompleted<O>>) {
        self.handle.send(CoordinatorMessage::Distribute {
            item,
            respond_to: Some(respond_to),
        });
    }

    /// Snapshot of the coordinator's bookkeeping, taken after every message sent before it.
    ///
    /// Returns `None` once the coordinator has stopped.
    #[instrument(skip(self), fields(coordinator = %self.handle.key()))]
    pub async fn status(&self) -> Option<CoordinatorStatus> {
        let (reply, receiver) = oneshot::channel();
        self.handle.try_send(CoordinatorMessage::Status(reply)).ok()?;
        receiver.await.ok()
    }

    /// Stops the coordinator and its workers.
    pub async fn stop(&self, timeout: Duration) -> StopOutcome {
        self.handle.stop(timeout).await
    }

    /// The underlying actor handle.
    #[must_use]
    pub const fn handle(&self) -> &ActorHandle<CoordinatorMessage<I, O>> {
        &self.handle
    }
}
