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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Courier
//!
//! An actor-supervised message dispatch core built on Tokio. Courier hosts
//! long-lived, supervised actors, binds message handlers to broker topics, and
//! routes inbound traffic to those handlers with batching, retry, and
//! dead-letter semantics. Outbound traffic goes through a retrying publisher.
//!
//! ## Key Concepts
//!
//! - **Actors (`Actor`, `ActorHandle`)**: single-task units with an ordered,
//!   non-blocking mailbox. Failures are classified by a `SupervisorPolicy`.
//! - **Runtime (`ActorRuntime`)**: owns the `ActorRegistry`, the root
//!   cancellation token, and the critical-failure shutdown path.
//! - **Coordinators (`Coordinator`)**: distribute work round-robin over a set of
//!   workers, track it by `WorkId`, and health-check workers with ping/pong.
//! - **Handlers (`HandlerRegistry`, `DispatchEngine`)**: explicit handler
//!   bindings resolved against `MessagingOptions`, one transport subscription
//!   per topic, per-handler batching.
//! - **Publishing (`Publisher`)**: serialize, publish, retry.
//! - **Transport (`Transport`)**: the narrow broker interface. `InMemoryTransport`
//!   is provided for tests and local runs.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierApp::launch_async().await;
//!     let options = MessagingOptions::new("memory://local", "billing");
//!     let host = MessagingHost::builder(options)
//!         .transport(InMemoryTransport::new())
//!         .handler(HandlerBinding::new("invoices", handler_fn(|batch| async move {
//!             tracing::info!(count = batch.len(), "received invoices");
//!             Ok(())
//!         })).topic("invoices"))
//!         .start(&runtime)
//!         .await?;
//!     host.publisher().publish_bytes("{}", "invoices").await;
//!     host.shutdown().await;
//!     runtime.shutdown_all().await;
//!     Ok(())
//! }
//! ```

/// Shared infrastructure: configuration, errors, runtime, registry, and handles.
pub(crate) mod common;

/// The actor execution layer: configuration, context, run loop, and supervision.
pub(crate) mod actor;

/// Mailbox envelopes, typed recipients, and transport payloads.
pub(crate) mod message;

/// Core traits implemented by actors, handlers, and transports.
pub(crate) mod traits;

/// Coordinator/worker work distribution.
pub(crate) mod coordination;

/// Handler discovery and inbound dispatch.
pub(crate) mod consumer;

/// Outbound publishing with retry.
pub(crate) mod publisher;

/// Transport implementations shipped with the crate.
pub(crate) mod transport;

/// Startup facade tying handlers, dispatch, and publishing together.
pub(crate) mod host;

/// A prelude module for conveniently importing the most commonly used items.
///
/// ## Macros (from `courier-macro`)
/// *   [`courier_macro::courier_message`]: Attribute macro for declaring messages and payloads.
///
/// ## External Crates
/// *   [`async_trait::async_trait`]: Needed to implement [`crate::traits::Actor`],
///     [`crate::traits::Transport`], and [`crate::traits::MessageHandler`].
/// *   [`bytes::Bytes`]: The payload type used by transports.
pub mod prelude {
    pub use courier_macro::*;

    pub use async_trait::async_trait;
    pub use bytes::Bytes;

    pub use crate::actor::{
        ActorConfig, ActorContext, Directive, RestartLimitExceeded, RestartLimiter,
        RestartLimiterConfig, SupervisionDecision, SupervisorPolicy,
    };
    pub use crate::common::config::{
        CourierConfig, DispatchConfig, HealthCheckConfig, PublisherConfig, TimeoutConfig,
        ZeroSubscriberPolicy, CONFIG,
    };
    pub use crate::common::{
        ActorError, ActorHandle, ActorKey, ActorRef, ActorRegistration, ActorRegistry,
        ActorRuntime, ActorState, CourierApp, CourierError, FailureKind, MessagingOptions,
        PoolRouter, RegistrationMode, RoutingStrategy, ShutdownSummary, StopOutcome,
        TransportError,
    };
    pub use crate::consumer::{
        handler_fn, json_handler, CommitStrategy, ConsumerMetadata, DispatchEngine,
        HandlerBinding, HandlerRegistry, HandlerSet, ProcessingConfig,
    };
    pub use crate::coordination::{
        Coordinator, CoordinatorBehavior, CoordinatorHandle, CoordinatorMessage,
        CoordinatorSettings, CoordinatorStatus, ForwardCompletions, HealthDecision,
        LogCompletions, Pong, WorkAbandoned, WorkCompleted, WorkId, WorkTicket, WorkerBehavior,
        WorkerId,
    };
    pub use crate::host::{MessagingHost, MessagingHostBuilder};
    pub use crate::message::{ConsumeMessage, PublishMessage, Recipient};
    pub use crate::publisher::{Publisher, PublisherSettings};
    pub use crate::traits::{Actor, MessageCallback, MessageHandler, Stoppable, Transport};
    pub use crate::transport::{InMemoryTransport, PublishedMessage};
}
