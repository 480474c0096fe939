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

use tokio::sync::oneshot;
use tracing::trace;

use crate::coordination::CoordinatorStatus;
use crate::message::Recipient;

/// Correlation id of one distributed work item, unique per coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(pub(crate) u64);

impl WorkId {
    /// The numeric id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work-{}", self.0)
    }
}

/// Identity of a worker within its coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub(crate) usize);

impl WorkerId {
    /// The worker's index at creation time.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// The result of a work item, reported by the worker that processed it.
#[derive(Debug, Clone)]
pub struct WorkCompleted<O> {
    /// The item this result belongs to.
    pub work_id: WorkId,
    /// The worker that produced it.
    pub worker: WorkerId,
    /// The result.
    pub result: O,
}

/// A work item whose ticket was dropped without a result.
///
/// Sent when processing failed or panicked, or when the worker holding the
/// item was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkAbandoned {
    /// The abandoned item.
    pub work_id: WorkId,
    /// The worker it was assigned to.
    pub worker: WorkerId,
}

/// A worker's answer to a health-check ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    /// The answering worker.
    pub worker: WorkerId,
}

/// The coordinator mailbox.
pub enum CoordinatorMessage<I, O> {
    /// Creates the workers and starts health checking. Repeats are ignored.
    Initialize,
    /// Hands `item` to the next worker.
    Distribute {
        /// The work item.
        item: I,
        /// Where the result goes when the coordinator forwards completions.
        respond_to: Option<Recipient<WorkCompleted<O>>>,
    },
    /// A worker finished an item.
    Completed(WorkCompleted<O>),
    /// A worker dropped an item without finishing it.
    Abandoned(WorkAbandoned),
    /// Periodic health check.
    HealthTick,
    /// A worker answered a ping.
    Pong(Pong),
    /// Requests a snapshot of the coordinator's bookkeeping.
    Status(oneshot::Sender<CoordinatorStatus>),
}

impl<I, O> From<WorkCompleted<O>> for CoordinatorMessage<I, O> {
    fn from(completed: WorkCompleted<O>) -> Self {
        Self::Completed(completed)
    }
}

impl<I, O> From<WorkAbandoned> for CoordinatorMessage<I, O> {
    fn from(abandoned: WorkAbandoned) -> Self {
        Self::Abandoned(abandoned)
    }
}

impl<I, O> From<Pong> for CoordinatorMessage<I, O> {
    fn from(pong: Pong) -> Self {
        Self::Pong(pong)
    }
}

/// The worker mailbox.
pub(crate) enum WorkerMessage<I, O> {
    Work { item: I, ticket: WorkTicket<O> },
    Ping { reply_to: Recipient<Pong> },
}

/// Proof of assignment handed to a worker with each item.
///
/// Completing the ticket reports the result to the coordinator that issued it.
/// A ticket that is dropped without completing reports the item as
/// [`WorkAbandoned`], so the coordinator stops tracking it.
#[derive(Debug)]
pub struct WorkTicket<O> {
    work_id: WorkId,
    worker: WorkerId,
    reply_to: Recipient<WorkCompleted<O>>,
    abandon_to: Recipient<WorkAbandoned>,
    settled: bool,
}

impl<O: Send + 'static> WorkTicket<O> {
    pub(crate) fn new(
        work_id: WorkId,
        worker: WorkerId,
        reply_to: Recipient<WorkCompleted<O>>,
        abandon_to: Recipient<WorkAbandoned>,
    ) -> Self {
        Self {
            work_id,
            worker,
            reply_to,
            abandon_to,
            settled: false,
        }
    }

    /// The id of the assigned item.
    #[must_use]
    pub const fn work_id(&self) -> WorkId {
        self.work_id
    }

    /// Reports the result to the coordinator.
    pub fn complete(mut self, result: O) {
        self.settled = true;
        self.reply_to.send(WorkCompleted {
            work_id: self.work_id,
            worker: self.worker,
            result,
        });
    }
}

impl<O> Drop for WorkTicket<O> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let abandoned = WorkAbandoned {
            work_id: self.work_id,
            worker: self.worker,
        };
        // A stopped coordinator no longer tracks the item.
        if self.abandon_to.try_send(abandoned).is_err() {
            trace!(work = %self.work_id, "coordinator gone, abandoned work not reported");
        }
    }
}
