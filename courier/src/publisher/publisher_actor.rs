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

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{error, instrument, trace, warn};

use crate::actor::ActorContext;
use crate::common::config::ZeroSubscriberPolicy;
use crate::common::{ActorError, MessagingOptions};
use crate::traits::{Actor, Transport};

/// Retry behavior of a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSettings {
    /// Retries after the first failed attempt.
    pub retry_count: u32,
    /// Fixed delay between attempts.
    pub retry_interval: Duration,
    /// Treatment of a publish that reached no subscribers.
    pub zero_subscriber_policy: ZeroSubscriberPolicy,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_interval: Duration::from_millis(1_000),
            zero_subscriber_policy: ZeroSubscriberPolicy::default(),
        }
    }
}

impl PublisherSettings {
    /// Retry budget taken from the messaging options.
    #[must_use]
    pub fn from_options(options: &MessagingOptions) -> Self {
        Self {
            retry_count: options.retry_count,
            retry_interval: options.retry_interval(),
            ..Self::default()
        }
    }

    /// Overrides the zero-subscriber policy.
    #[must_use]
    pub const fn with_zero_subscriber_policy(mut self, policy: ZeroSubscriberPolicy) -> Self {
        self.zero_subscriber_policy = policy;
        self
    }
}

pub(crate) struct PublishRequest {
    pub(crate) topic: String,
    pub(crate) payload: Bytes,
    pub(crate) reply: Option<oneshot::Sender<bool>>,
}

enum Attempt {
    Delivered,
    Retry,
    GiveUp,
}

pub(crate) struct PublisherActor {
    transport: Arc<dyn Transport>,
    settings: PublisherSettings,
}

impl PublisherActor {
    pub(crate) fn new(transport: Arc<dyn Transport>, settings: PublisherSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn publish(&self, topic: &str, payload: Bytes) -> bool {
        let attempts = self.settings.retry_count.saturating_add(1);
        for attempt in 1..=attempts {
            match self.attempt(topic, payload.clone(), attempt).await {
                Attempt::Delivered => return true,
                Attempt::GiveUp => return false,
                Attempt::Retry if attempt < attempts => {
                    tokio::time::sleep(self.settings.retry_interval).await;
                }
                Attempt::Retry => {}
            }
        }
        error!(attempts, "publish failed, giving up");
        false
    }

    async fn attempt(&self, topic: &str, payload: Bytes, attempt: u32) -> Attempt {
        match self.transport.publish(topic, payload).await {
            Ok(0) if self.transport.reports_subscriber_count() => {
                match self.settings.zero_subscriber_policy {
                    ZeroSubscriberPolicy::Accept => {
                        trace!(attempt, "published with no subscribers");
                        Attempt::Delivered
                    }
                    ZeroSubscriberPolicy::Fail => {
                        warn!(attempt, "no subscribers, not retrying");
                        Attempt::GiveUp
                    }
                    ZeroSubscriberPolicy::Retry => {
                        warn!(attempt, "no subscribers");
                        Attempt::Retry
                    }
                }
            }
            Ok(receivers) => {
                trace!(attempt, receivers, "published");
                Attempt::Delivered
            }
            Err(err) => {
                warn!(attempt, "publish failed: {err}");
                Attempt::Retry
            }
        }
    }
}

#[async_trait]
impl Actor for PublisherActor {
    type Message = PublishRequest;

    async fn handle(
        &mut self,
        request: PublishRequest,
        _ctx: &mut ActorContext<PublishRequest>,
    ) -> Result<(), ActorError> {
        let delivered = self.publish(&request.topic, request.payload).await;
        if let Some(reply) = request.reply {
            let _ = reply.send(delivered);
        }
        Ok(())
    }
}
