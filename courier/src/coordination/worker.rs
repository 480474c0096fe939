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
use tracing::trace;

use crate::actor::ActorContext;
use crate::common::ActorError;
use crate::coordination::messages::{Pong, WorkerMessage};
use crate::coordination::{WorkTicket, WorkerId};
use crate::traits::Actor;

/// The processing side of a coordinator/worker pair.
///
/// Each worker runs as its own supervised actor, so `process` sees one item
/// at a time. Call [`WorkTicket::complete`] to report the result; it may be
/// completed later from another task if processing is handed off. A ticket
/// dropped without a result, as happens when `process` fails, reports the item
/// as abandoned.
#[async_trait]
pub trait WorkerBehavior: Send + 'static {
    /// The work item type.
    type Item: Send + 'static;
    /// The result type.
    type Output: Send + 'static;

    /// Processes one item.
    async fn process(
        &mut self,
        item: Self::Item,
        ticket: WorkTicket<Self::Output>,
    ) -> Result<(), ActorError>;
}

pub(crate) struct WorkerActor<W: WorkerBehavior> {
    id: WorkerId,
    behavior: W,
}

impl<W: WorkerBehavior> WorkerActor<W> {
    pub(crate) const fn new(id: WorkerId, behavior: W) -> Self {
        Self { id, behavior }
    }
}

#[async_trait]
impl<W: WorkerBehavior> Actor for WorkerActor<W> {
    type Message = WorkerMessage<W::Item, W::Output>;

    async fn handle(
        &mut self,
        message: Self::Message,
        _ctx: &mut ActorContext<Self::Message>,
    ) -> Result<(), ActorError> {
        match message {
            WorkerMessage::Work { item, ticket } => {
                trace!(worker = %self.id, work = %ticket.work_id(), "processing work");
                self.behavior.process(item, ticket).await
            }
            WorkerMessage::Ping { reply_to } => {
                reply_to.send(Pong { worker: self.id });
                Ok(())
            }
        }
    }
}
