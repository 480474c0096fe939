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

//! Shared infrastructure used by every other module.
//!
//! *   [`CourierApp`]: Entry point that builds an [`ActorRuntime`].
//! *   [`ActorRuntime`]: Spawns actors, owns the [`ActorRegistry`], and drives shutdown.
//! *   [`ActorHandle`]: Address of a single running actor.
//! *   [`ActorRef`] / [`PoolRouter`]: Addresses handed out by the registry.
//! *   [`CourierError`], [`TransportError`], [`ActorError`]: The error taxonomy.
//! *   [`MessagingOptions`]: Validated broker-facing options.

pub use actor_handle::ActorHandle;
pub use actor_runtime::ActorRuntime;
pub use courier_app::CourierApp;
pub use error::{ActorError, CourierError, FailureKind, TransportError};
pub use options::MessagingOptions;
pub use registry::{ActorRef, ActorRegistration, ActorRegistry, RegistrationMode};
pub use router::{PoolRouter, RoutingStrategy};
pub use types::*;

/// Common identifiers, states, and outcome types.
mod types;

/// Defines the `CourierApp` entry point.
mod courier_app;
/// Defines the `ActorHandle` for actor interaction.
mod actor_handle;
/// Defines the `ActorRuntime`.
mod actor_runtime;
/// Keyed table of registered actors.
mod registry;
/// Round-robin and random routing over pooled actors.
mod router;
/// Error types.
mod error;
/// Broker-facing messaging options and their validation.
mod options;
/// Runtime configuration loaded from XDG-compliant locations.
pub mod config;
