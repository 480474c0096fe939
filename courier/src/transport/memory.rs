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

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::common::TransportError;
use crate::message::ConsumeMessage;
use crate::traits::{MessageCallback, Transport};

/// A payload recorded by [`InMemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: String,
    /// The payload as published.
    pub payload: Bytes,
}

#[derive(Default)]
struct GroupSubscription {
    callbacks: Vec<MessageCallback>,
    cursor: AtomicUsize,
}

impl GroupSubscription {
    fn next(&self) -> Option<MessageCallback> {
        if self.callbacks.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.callbacks.len();
        Some(self.callbacks[index].clone())
    }
}

#[derive(Default)]
struct Inner {
    subscriptions: DashMap<String, DashMap<String, GroupSubscription>>,
    published: Mutex<Vec<PublishedMessage>>,
    commits: DashMap<String, usize>,
    closed: AtomicBool,
}

/// A process-local pub/sub transport.
///
/// Every consumer group subscribed to a topic receives each message once; the
/// subscribers inside one group take turns. Delivery happens synchronously
/// inside [`publish`](Transport::publish), which reports the number of groups
/// reached. Every publish is recorded for inspection.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("topics", &self.inner.subscriptions.len())
            .field("published", &self.inner.published.lock().len())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl InMemoryTransport {
    /// An open transport with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.published.lock().clone()
    }

    /// The payloads published to `topic`, in order.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<Bytes> {
        self.inner
            .published
            .lock()
            .iter()
            .filter(|message| message.topic == topic)
            .map(|message| message.payload.clone())
            .collect()
    }

    /// Consumer groups subscribed to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .subscriptions
            .get(topic)
            .map_or(0, |groups| groups.len())
    }

    /// Subscriptions opened for `topic`, across all groups.
    #[must_use]
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.inner.subscriptions.get(topic).map_or(0, |groups| {
            groups.iter().map(|group| group.callbacks.len()).sum()
        })
    }

    /// Messages committed on `topic`.
    #[must_use]
    pub fn commits(&self, topic: &str) -> usize {
        self.inner.commits.get(topic).map_or(0, |count| *count)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn subscribe(
        &self,
        topic: &str,
        consumer_group: &str,
        on_message: MessageCallback,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.inner
            .subscriptions
            .entry(topic.to_string())
            .or_default()
            .entry(consumer_group.to_string())
            .or_default()
            .callbacks
            .push(on_message);
        trace!(%topic, %consumer_group, "subscribed");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<usize, TransportError> {
        self.ensure_open()?;
        self.inner.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        // Collect first so no map guard is held while callbacks run.
        let receivers: Vec<MessageCallback> = self
            .inner
            .subscriptions
            .get(topic)
            .map(|groups| groups.iter().filter_map(|group| group.next()).collect())
            .unwrap_or_default();
        for callback in &receivers {
            callback(topic, payload.clone());
        }
        Ok(receivers.len())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.subscriptions.clear();
        trace!("in-memory transport closed");
        Ok(())
    }

    fn reports_subscriber_count(&self) -> bool {
        true
    }

    async fn commit(&self, topic: &str, messages: &[ConsumeMessage]) -> Result<(), TransportError> {
        self.ensure_open()?;
        *self.inner.commits.entry(topic.to_string()).or_default() += messages.len();
        Ok(())
    }
}
