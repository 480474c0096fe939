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

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::common::TransportError;
use crate::message::ConsumeMessage;

/// Callback invoked by a transport for every message on a subscribed topic.
///
/// It must not block: implementations inside Courier only enqueue.
pub type MessageCallback = Arc<dyn Fn(&str, Bytes) + Send + Sync>;

/// The broker interface.
///
/// Adapters for concrete brokers implement this trait. A single transport
/// value is shared by every publisher and dispatcher, so implementations are
/// responsible for their own synchronization.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Starts delivering messages published on `topic` to `on_message`.
    async fn subscribe(
        &self,
        topic: &str,
        consumer_group: &str,
        on_message: MessageCallback,
    ) -> Result<(), TransportError>;

    /// Publishes a payload. Returns the number of subscribers reached or acks received.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<usize, TransportError>;

    /// Releases the connection. Later calls fail with [`TransportError::Closed`].
    async fn close(&self) -> Result<(), TransportError>;

    /// Whether the count returned by [`publish`](Transport::publish) is a
    /// subscriber count (pub/sub semantics) that may legitimately be zero.
    fn reports_subscriber_count(&self) -> bool {
        false
    }

    /// Acknowledges messages that are fully processed.
    async fn commit(
        &self,
        _topic: &str,
        _messages: &[ConsumeMessage],
    ) -> Result<(), TransportError> {
        Ok(())
    }
}
