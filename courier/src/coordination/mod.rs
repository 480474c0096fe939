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

//! Coordinator/worker work distribution.
//!
//! A [`Coordinator`] owns a fixed set of workers, hands out work round-robin,
//! and tracks every item by [`WorkId`] until the worker reports it complete
//! through its [`WorkTicket`]. Workers are health-checked with ping/pong; what
//! happens to a worker that stops answering is decided by the coordinator's
//! [`CoordinatorBehavior`].

pub use coordinator::{
    Coordinator, CoordinatorBehavior, CoordinatorHandle, CoordinatorSettings, CoordinatorStatus,
    ForwardCompletions, HealthDecision, LogCompletions,
};
pub use messages::{
    CoordinatorMessage, Pong, WorkAbandoned, WorkCompleted, WorkId, WorkTicket, WorkerId,
};
pub use worker::WorkerBehavior;

mod coordinator;
mod messages;
mod work_context;
mod worker;
