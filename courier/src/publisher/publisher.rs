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
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, instrument, warn};

use crate::common::{ActorKey, ActorRef, ActorRegistration, ActorRuntime, CourierError, StopOutcome};
use crate::message::PublishMessage;
use crate::publisher::publisher_actor::{PublishRequest, PublisherActor};
use crate::publisher::PublisherSettings;
use crate::traits::Transport;

/// Handle to a registered publisher.
///
/// Publishers are registered as `("publisher", name)`, so a second publisher
/// with the same name is rejected. A pooled registration spreads publishes
/// over several actors; a singleton publishes strictly in call order.
#[derive(Clone, Debug)]
pub struct Publisher {
    address: ActorRef<PublishRequest>,
}

impl Publisher {
    /// Registers a publisher on `runtime`.
    ///
    /// # Errors
    ///
    /// [`CourierError::RegistrationConflict`] when a publisher with this name
    /// exists, or [`CourierError::InvalidRegistration`] for a bad pool shape.
    pub fn register(
        runtime: &ActorRuntime,
        name: &str,
        registration: ActorRegistration,
        transport: Arc<dyn Transport>,
        settings: PublisherSettings,
    ) -> Result<Self, CourierError> {
        let address = runtime.register("publisher", name, registration, move || {
            PublisherActor::new(transport.clone(), settings.clone())
        })?;
        Ok(Self { address })
    }

    /// Serializes `message` as JSON and publishes it. Returns `false` when
    /// serialization fails or every attempt failed.
    pub async fn publish<T: Serialize + ?Sized>(&self, message: &T, topic: &str) -> bool {
        match serde_json::to_vec(message) {
            Ok(payload) => self.publish_bytes(payload, topic).await,
            Err(err) => {
                error!(%topic, "could not serialize message: {err}");
                false
            }
        }
    }

    /// Publishes a pre-serialized payload.
    #[instrument(skip(self, payload), fields(publisher = %self.address.key()))]
    pub async fn publish_bytes(&self, payload: impl Into<Bytes>, topic: &str) -> bool {
        let (reply, delivered) = oneshot::channel();
        let request = PublishRequest {
            topic: topic.to_string(),
            payload: payload.into(),
            reply: Some(reply),
        };
        if let Err(err) = self.address.try_send(request) {
            warn!("publish rejected: {err}");
            return false;
        }
        delivered.await.unwrap_or(false)
    }

    /// Publishes a [`PublishMessage`].
    pub async fn publish_message(&self, message: PublishMessage) -> bool {
        self.publish_bytes(message.payload, &message.topic).await
    }

    /// Publishes without waiting for the outcome. Failures are only logged.
    pub fn publish_detached(&self, payload: impl Into<Bytes>, topic: &str) {
        self.address.send(PublishRequest {
            topic: topic.to_string(),
            payload: payload.into(),
            reply: None,
        });
    }

    /// The registry key.
    #[must_use]
    pub fn key(&self) -> &ActorKey {
        self.address.key()
    }

    /// Stops the publisher after queued publishes finish.
    pub async fn stop(&self, timeout: Duration) -> StopOutcome {
        self.address.stop(timeout).await
    }
}
