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

use tracing::{error, info, instrument, warn};

use crate::common::{ActorRegistration, ActorRuntime, CourierError, MessagingOptions, StopOutcome};
use crate::consumer::{DispatchEngine, HandlerBinding, HandlerRegistry, HandlerSet};
use crate::publisher::{Publisher, PublisherSettings};
use crate::traits::Transport;

/// A running messaging stack: handler registry, dispatch engine, and publisher
/// over one shared transport.
///
/// Build it with [`MessagingHost::builder`]. Stop it with
/// [`shutdown`](MessagingHost::shutdown) before shutting the runtime down so
/// buffered messages are flushed.
pub struct MessagingHost {
    options: MessagingOptions,
    registry: HandlerRegistry,
    engine: DispatchEngine,
    publisher: Publisher,
    transport: Arc<dyn Transport>,
    runtime: ActorRuntime,
}

/// Collects the transport and handlers for a [`MessagingHost`].
pub struct MessagingHostBuilder {
    options: MessagingOptions,
    transport: Option<Arc<dyn Transport>>,
    sets: Vec<HandlerSet>,
    bindings: Vec<HandlerBinding>,
    publisher_name: String,
    publisher_registration: ActorRegistration,
}

impl fmt::Debug for MessagingHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingHost")
            .field("registry", &self.registry)
            .field("engine", &self.engine)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl MessagingHost {
    /// Starts building a host for `options`.
    #[must_use]
    pub fn builder(options: MessagingOptions) -> MessagingHostBuilder {
        MessagingHostBuilder {
            options,
            transport: None,
            sets: Vec::new(),
            bindings: Vec::new(),
            publisher_name: "default".to_string(),
            publisher_registration: ActorRegistration::singleton(),
        }
    }

    /// The validated options.
    #[must_use]
    pub const fn options(&self) -> &MessagingOptions {
        &self.options
    }

    /// The resolved consumers.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The dispatch engine.
    #[must_use]
    pub const fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    /// The publisher.
    #[must_use]
    pub const fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Stops within the runtime's configured shutdown timeout.
    pub async fn shutdown(&self) {
        self.shutdown_within(self.runtime.config().system_shutdown_timeout())
            .await;
    }

    /// Flushes and stops the dispatchers, stops the publisher, then closes the
    /// transport. Problems are logged.
    #[instrument(skip(self))]
    pub async fn shutdown_within(&self, grace: Duration) {
        self.engine.shutdown_within(grace).await;
        if self.runtime.registry().remove(self.publisher.key()).is_none() {
            warn!(publisher = %self.publisher.key(), "publisher was already unregistered");
        }
        if self.publisher.stop(grace).await == StopOutcome::Forced {
            warn!("publisher had to be cancelled");
        }
        if let Err(err) = self.transport.close().await {
            error!("closing the transport failed: {err}");
        }
        info!("messaging host stopped");
    }
}

impl MessagingHostBuilder {
    /// Uses `transport` for subscriptions and publishing.
    #[must_use]
    pub fn transport<T: Transport>(self, transport: T) -> Self {
        self.transport_arc(Arc::new(transport))
    }

    /// Uses a shared transport.
    #[must_use]
    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Adds a handler set.
    #[must_use]
    pub fn handlers(mut self, set: HandlerSet) -> Self {
        self.sets.push(set);
        self
    }

    /// Adds a single binding. Duplicate ids among single bindings are errors.
    #[must_use]
    pub fn handler(mut self, binding: HandlerBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Registers the publisher as `("publisher", name)`. Defaults to `default`.
    #[must_use]
    pub fn publisher_name(mut self, name: impl Into<String>) -> Self {
        self.publisher_name = name.into();
        self
    }

    /// Registers the publisher with a specific shape, such as a pool.
    #[must_use]
    pub fn publisher_registration(mut self, registration: ActorRegistration) -> Self {
        self.publisher_registration = registration;
        self
    }

    /// Validates the options, resolves every handler, subscribes, and
    /// registers the publisher.
    ///
    /// # Errors
    ///
    /// * [`CourierError::Configuration`] for invalid options, unresolvable
    ///   handlers, or a missing transport.
    /// * [`CourierError::RegistrationConflict`] for a duplicate single binding
    ///   or publisher name.
    /// * [`CourierError::Transport`] when a subscription fails.
    #[instrument(skip_all, fields(publisher = %self.publisher_name))]
    pub async fn start(self, runtime: &ActorRuntime) -> Result<MessagingHost, CourierError> {
        self.options.validate()?;
        let transport = self.transport.ok_or_else(|| {
            CourierError::Configuration(vec!["no transport configured".to_string()])
        })?;

        let mut registry = HandlerRegistry::new(self.options.clone())
            .with_dispatch_defaults(runtime.config().dispatch.clone());
        for set in self.sets {
            registry.register(set)?;
        }
        for binding in self.bindings {
            registry.register_handler(binding)?;
        }

        let settings = PublisherSettings::from_options(&self.options)
            .with_zero_subscriber_policy(runtime.config().publisher.zero_subscriber_policy);
        let publisher = Publisher::register(
            runtime,
            &self.publisher_name,
            self.publisher_registration,
            transport.clone(),
            settings,
        )?;

        let engine = match DispatchEngine::start(runtime, &registry, transport.clone()).await {
            Ok(engine) => engine,
            Err(err) => {
                let _ = runtime.unregister("publisher", &self.publisher_name).await;
                return Err(err);
            }
        };

        info!(
            consumers = registry.len(),
            topics = engine.topics().count(),
            "messaging host started"
        );
        Ok(MessagingHost {
            options: self.options,
            registry,
            engine,
            publisher,
            transport,
            runtime: runtime.clone(),
        })
    }
}
