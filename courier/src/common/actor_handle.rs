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
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{instrument, trace, warn};

use crate::common::{ActorKey, ActorState, CourierError, LifecycleCell, StopOutcome};
use crate::message::{Envelope, Recipient, SystemSignal};
use crate::traits::Stoppable;

/// Address of a running actor.
///
/// Handles are cheap to clone. Sending never blocks: the mailbox is unbounded
/// and messages from one handle are processed in the order they were sent.
pub struct ActorHandle<M> {
    key: ActorKey,
    outbox: mpsc::UnboundedSender<Envelope<M>>,
    pub(crate) tracker: TaskTracker,
    pub(crate) cancellation_token: CancellationToken,
    pub(crate) state: LifecycleCell,
}

impl<M> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            outbox: self.outbox.clone(),
            tracker: self.tracker.clone(),
            cancellation_token: self.cancellation_token.clone(),
            state: self.state.clone(),
        }
    }
}

impl<M> fmt::Debug for ActorHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("key", &self.key)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl<M: Send + 'static> ActorHandle<M> {
    pub(crate) fn new(
        key: ActorKey,
        outbox: mpsc::UnboundedSender<Envelope<M>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            key,
            outbox,
            tracker: TaskTracker::new(),
            cancellation_token,
            state: LifecycleCell::default(),
        }
    }

    /// The actor identity.
    #[must_use]
    pub const fn key(&self) -> &ActorKey {
        &self.key
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ActorState {
        self.state.get()
    }

    /// `true` once the mailbox no longer accepts messages.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Enqueues a message.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::MailboxClosed`] when the actor has stopped accepting messages.
    pub fn try_send(&self, message: M) -> Result<(), CourierError> {
        self.outbox
            .send(Envelope::Message(message))
            .map_err(|_| CourierError::MailboxClosed(self.key.clone()))
    }

    /// Enqueues a message. A closed mailbox is logged and the message dropped.
    pub fn send(&self, message: M) {
        if self.try_send(message).is_err() {
            warn!(actor = %self.key, "mailbox closed, dropping message");
        }
    }

    /// A typed address for any message convertible into `M`.
    pub fn recipient<T>(&self) -> Recipient<T>
    where
        T: Send + 'static,
        M: From<T>,
    {
        let handle = self.clone();
        Recipient::from_fn(self.key.to_string(), move |message: T| {
            handle.try_send(M::from(message))
        })
    }

    /// Requests a graceful stop and waits up to `timeout` for the mailbox to drain.
    ///
    /// Messages sent before the stop request are still processed. If the actor
    /// has not exited when `timeout` elapses it is cancelled. The outcome is
    /// logged and returned, never raised.
    #[instrument(skip(self), fields(actor = %self.key))]
    pub async fn stop(&self, timeout: Duration) -> StopOutcome {
        if self.state() == ActorState::Stopped {
            return StopOutcome::AlreadyStopped;
        }
        if self.outbox.send(Envelope::Signal(SystemSignal::Terminate)).is_err() {
            trace!("mailbox already closed, waiting for the run loop to exit");
        }
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            trace!("actor stopped gracefully");
            return StopOutcome::Graceful;
        }
        warn!(timeout_ms = timeout.as_millis(), "actor did not stop in time, cancelling");
        self.cancellation_token.cancel();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!("actor still running after cancellation");
        }
        StopOutcome::Forced
    }
}

#[async_trait]
impl<M: Send + 'static> Stoppable for ActorHandle<M> {
    fn key(&self) -> &ActorKey {
        &self.key
    }

    async fn stop_within(&self, timeout: Duration) -> StopOutcome {
        self.stop(timeout).await
    }
}
