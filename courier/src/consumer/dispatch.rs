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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{error, info, instrument, trace, warn};

use crate::actor::ActorConfig;
use crate::common::{ActorHandle, ActorRuntime, CourierError, ShutdownSummary};
use crate::consumer::topic_dispatcher::{DispatchCommand, TopicDispatcher};
use crate::consumer::HandlerRegistry;
use crate::message::ConsumeMessage;
use crate::traits::{MessageCallback, Transport};

struct Route {
    consumer_group: String,
    dispatchers: Vec<ActorHandle<DispatchCommand>>,
}

/// Routes inbound transport traffic to the registered handlers.
///
/// The engine opens exactly one subscription per distinct topic and fans each
/// message out to one dispatcher actor per (handler, topic) pair. Messages on
/// a topic reach a handler in arrival order.
pub struct DispatchEngine {
    runtime: ActorRuntime,
    accepting: Arc<AtomicBool>,
    routes: IndexMap<String, Route>,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("topics", &self.routes.keys().collect::<Vec<_>>())
            .field("accepting", &self.accepting.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    /// Spawns the dispatchers and subscribes to every resolved topic.
    ///
    /// # Errors
    ///
    /// [`CourierError::Transport`] when a subscription fails. Dispatchers
    /// spawned so far are stopped before the error is returned.
    #[instrument(skip_all, fields(consumers = registry.len()))]
    pub async fn start(
        runtime: &ActorRuntime,
        registry: &HandlerRegistry,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CourierError> {
        let default_group = registry.options().consumer_group_id.clone();
        let mut routes: IndexMap<String, Route> = IndexMap::new();

        for consumer in registry.consumers() {
            let group = consumer
                .consumer_group_id
                .clone()
                .unwrap_or_else(|| default_group.clone());
            for topic in &consumer.topics {
                let dispatcher = TopicDispatcher::new(
                    &consumer.handler_id,
                    topic,
                    consumer.handler.clone(),
                    consumer.processing.clone(),
                    transport.clone(),
                );
                let config =
                    ActorConfig::named("dispatcher", format!("{}@{topic}", consumer.handler_id));
                let handle = runtime.spawn_actor(config, dispatcher);

                let route = routes.entry(topic.clone()).or_insert_with(|| Route {
                    consumer_group: group.clone(),
                    dispatchers: Vec::new(),
                });
                if route.consumer_group != group {
                    warn!(
                        %topic,
                        handler = %consumer.handler_id,
                        kept = %route.consumer_group,
                        ignored = %group,
                        "conflicting consumer groups on one topic, keeping the first"
                    );
                }
                route.dispatchers.push(handle);
            }
        }

        let engine = Self {
            runtime: runtime.clone(),
            accepting: Arc::new(AtomicBool::new(true)),
            routes,
        };

        for (topic, route) in &engine.routes {
            let callback = engine.callback(&route.dispatchers);
            if let Err(err) = transport
                .subscribe(topic, &route.consumer_group, callback)
                .await
            {
                error!(%topic, "subscription failed: {err}");
                engine.shutdown().await;
                return Err(err.into());
            }
            trace!(
                %topic,
                group = %route.consumer_group,
                handlers = route.dispatchers.len(),
                "subscribed"
            );
        }
        info!(topics = engine.routes.len(), "dispatch engine started");
        Ok(engine)
    }

    fn callback(&self, dispatchers: &[ActorHandle<DispatchCommand>]) -> MessageCallback {
        let accepting = self.accepting.clone();
        let dispatchers = dispatchers.to_vec();
        Arc::new(move |topic: &str, payload: Bytes| {
            if !accepting.load(Ordering::Acquire) {
                trace!(%topic, "engine is shutting down, ignoring message");
                return;
            }
            let message = ConsumeMessage::new(topic, payload);
            for dispatcher in &dispatchers {
                dispatcher.send(DispatchCommand::Deliver(message.clone()));
            }
        })
    }

    /// The subscribed topics in subscription order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Number of (handler, topic) dispatchers.
    #[must_use]
    pub fn dispatcher_count(&self) -> usize {
        self.routes.values().map(|route| route.dispatchers.len()).sum()
    }

    /// Stops within the runtime's configured shutdown timeout.
    pub async fn shutdown(&self) -> ShutdownSummary {
        self.shutdown_within(self.runtime.config().system_shutdown_timeout())
            .await
    }

    /// Stops accepting messages, flushes every buffer, and stops the
    /// dispatchers, each within `grace`.
    #[instrument(skip(self))]
    pub async fn shutdown_within(&self, grace: Duration) -> ShutdownSummary {
        self.accepting.store(false, Ordering::Release);
        let dispatchers: Vec<&ActorHandle<DispatchCommand>> = self
            .routes
            .values()
            .flat_map(|route| route.dispatchers.iter())
            .collect();
        let outcomes = join_all(dispatchers.iter().map(|dispatcher| async move {
            (dispatcher.key().clone(), dispatcher.stop(grace).await)
        }))
        .await;

        let mut summary = ShutdownSummary::default();
        for (key, outcome) in outcomes {
            summary.record(key, outcome);
        }
        if !summary.is_clean() {
            let forced: Vec<String> = summary.forced.iter().map(ToString::to_string).collect();
            error!(
                grace_ms = grace.as_millis(),
                "{} dispatcher(s) did not drain in time: {}",
                forced.len(),
                forced.join(", ")
            );
        }
        info!("dispatch engine stopped");
        summary
    }
}
