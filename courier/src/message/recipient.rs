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

use tokio::sync::mpsc;
use tracing::warn;

use crate::common::CourierError;

type Deliver<T> = Arc<dyn Fn(T) -> Result<(), CourierError> + Send + Sync>;

/// A typed, send-only address.
///
/// Recipients are how actors reply to each other without knowing each other's
/// full message type: any [`ActorHandle<M>`](crate::common::ActorHandle) whose
/// message type implements `From<T>` can hand out a `Recipient<T>`.
pub struct Recipient<T> {
    label: Arc<str>,
    deliver: Deliver<T>,
}

impl<T> Clone for Recipient<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            deliver: self.deliver.clone(),
        }
    }
}

impl<T> fmt::Debug for Recipient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Recipient").field(&self.label).finish()
    }
}

impl<T: Send + 'static> Recipient<T> {
    /// Builds a recipient from a delivery function.
    pub fn from_fn<F>(label: impl Into<String>, deliver: F) -> Self
    where
        F: Fn(T) -> Result<(), CourierError> + Send + Sync + 'static,
    {
        Self {
            label: Arc::from(label.into()),
            deliver: Arc::new(deliver),
        }
    }

    /// Delivers into a plain channel. Useful at the edge of the actor system.
    pub fn from_channel(label: impl Into<String>, sender: mpsc::UnboundedSender<T>) -> Self {
        let label = label.into();
        let key = crate::common::ActorKey::new("channel", label.clone());
        Self::from_fn(label, move |message| {
            sender
                .send(message)
                .map_err(|_| CourierError::MailboxClosed(key.clone()))
        })
    }

    /// Delivers a message, reporting a closed mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::MailboxClosed`] when the target no longer accepts messages.
    pub fn try_send(&self, message: T) -> Result<(), CourierError> {
        (self.deliver)(message)
    }

    /// Delivers a message; a closed mailbox is logged.
    pub fn send(&self, message: T) {
        if let Err(err) = self.try_send(message) {
            warn!(recipient = %self.label, "dropping message: {err}");
        }
    }

    /// Human-readable target description.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_recipient_delivers_and_reports_closure() {
        let (tx, mut rx) = mpsc::unbounded_channel::<u32>();
        let recipient = Recipient::from_channel("results", tx);
        recipient.send(1);
        assert!(recipient.clone().try_send(2).is_ok());
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        drop(rx);
        assert!(matches!(
            recipient.try_send(3),
            Err(CourierError::MailboxClosed(_))
        ));
    }
}
