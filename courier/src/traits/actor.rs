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

use async_trait::async_trait;

use crate::actor::ActorContext;
use crate::common::ActorError;

/// Behavior executed by a supervised actor.
///
/// Exactly one task drives an actor, so implementations can keep plain
/// mutable state without locks. Messages are handled one at a time, in the
/// order they were sent to the actor's handle.
///
/// Returning an error (or panicking) hands the failure to the actor's
/// [`SupervisorPolicy`](crate::actor::SupervisorPolicy).
///
/// ```rust,ignore
/// struct Counter(u64);
///
/// #[async_trait]
/// impl Actor for Counter {
///     type Message = u64;
///
///     async fn handle(&mut self, n: u64, _ctx: &mut ActorContext<u64>) -> Result<(), ActorError> {
///         self.0 += n;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Actor: Send + 'static {
    /// The mailbox message type.
    type Message: Send + 'static;

    /// Runs before the first message. An error here is an initialization failure.
    async fn started(&mut self, _ctx: &mut ActorContext<Self::Message>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Handles one message.
    async fn handle(
        &mut self,
        message: Self::Message,
        ctx: &mut ActorContext<Self::Message>,
    ) -> Result<(), ActorError>;

    /// Runs once after the mailbox is drained, and before a restart replaces this value.
    async fn stopped(&mut self, _ctx: &mut ActorContext<Self::Message>) {}
}
