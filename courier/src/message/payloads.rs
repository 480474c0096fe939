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
use std::time::Instant;

use bytes::Bytes;
use courier_macro::courier_message;

/// A message delivered by the transport on a subscribed topic.
#[courier_message]
pub struct ConsumeMessage {
    topic: Arc<str>,
    payload: Bytes,
    received_at: Instant,
}

impl ConsumeMessage {
    /// Wraps a payload received on `topic`.
    pub fn new(topic: &str, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: Arc::from(topic),
            payload: payload.into(),
            received_at: Instant::now(),
        }
    }

    /// The topic the message arrived on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The raw payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// When the transport handed the message over.
    #[must_use]
    pub const fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Decodes the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns the decode error when the payload is not valid JSON for `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// An outbound payload and its destination topic.
#[courier_message]
pub struct PublishMessage {
    /// Destination topic.
    pub topic: String,
    /// Serialized payload.
    pub payload: Bytes,
}

impl PublishMessage {
    /// Serializes `message` as JSON for `topic`.
    ///
    /// # Errors
    ///
    /// Returns the serialization error when `message` cannot be encoded.
    pub fn json<T: serde::Serialize>(topic: &str, message: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic: topic.to_string(),
            payload: Bytes::from(serde_json::to_vec(message)?),
        })
    }
}
