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

//! The actor execution layer.
//!
//! *   [`ActorConfig`]: Identity, supervision policy, and criticality of one actor.
//! *   [`ActorContext`]: What an actor can reach from inside its hooks.
//! *   [`SupervisorPolicy`]: Failure classification and failure budget.
//!
//! Actors are spawned through [`ActorRuntime`](crate::common::ActorRuntime);
//! the run loop itself is internal.

pub use actor_config::ActorConfig;
pub use actor_context::ActorContext;
pub(crate) use managed_actor::{panic_message, ManagedActor};
pub use restart_limiter::{RestartLimitExceeded, RestartLimiter, RestartLimiterConfig};
pub(crate) use supervision::Supervisor;
pub use supervision::{Directive, SupervisionDecision, SupervisorPolicy};

/// Contains the `ActorConfig` struct for actor initialization.
mod actor_config;

/// Contains the per-actor context handed to hooks.
mod actor_context;

/// Contains the mailbox run loop.
mod managed_actor;

/// Contains the rolling failure budget.
mod restart_limiter;

/// Contains failure classification and per-actor supervision state.
mod supervision;
