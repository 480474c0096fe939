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

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, instrument, trace, warn};

use crate::actor::{panic_message, ActorContext};
use crate::common::{ActorError, CourierError};
use crate::consumer::{CommitStrategy, ProcessingConfig};
use crate::message::ConsumeMessage;
use crate::traits::{Actor, MessageHandler, Transport};

pub(crate) enum DispatchCommand {
    Deliver(ConsumeMessage),
    FlushDue { generation: u64 },
}

/// Buffers one topic's messages for one handler and runs the handler on flush.
///
/// Every flush invalidates the pending timeout by bumping `generation`, so a
/// stale `FlushDue` never cuts a later batch short.
pub(crate) struct TopicDispatcher {
    handler_id: Arc<str>,
    topic: String,
    handler: Arc<dyn MessageHandler>,
    processing: ProcessingConfig,
    transport: Arc<dyn Transport>,
    buffer: Vec<ConsumeMessage>,
    generation: u64,
}

impl TopicDispatcher {
    pub(crate) fn new(
        handler_id: &str,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
        processing: ProcessingConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            handler_id: Arc::from(handler_id),
            topic: topic.to_string(),
            handler,
            processing,
            transport,
            buffer: Vec::new(),
            generation: 0,
        }
    }

    async fn flush(&mut self) {
        self.generation += 1;
        if self.buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.buffer);
        self.process(batch).await;
    }

    #[instrument(
        skip(self, batch),
        fields(handler = %self.handler_id, topic = %self.topic, size = batch.len())
    )]
    async fn process(&self, batch: Vec<ConsumeMessage>) {
        match self.processing.commit_strategy {
            CommitStrategy::AfterSuccessfulProcessing => {
                let attempts = self.processing.max_retries.saturating_add(1);
                let mut last_error = None;
                for attempt in 1..=attempts {
                    match self.invoke(batch.clone()).await {
                        Ok(()) => {
                            trace!(attempt, "batch processed");
                            self.commit(&batch).await;
                            return;
                        }
                        Err(err) => {
                            warn!(attempt, attempts, "{err}");
                            last_error = Some(err);
                            if attempt < attempts {
                                tokio::time::sleep(self.processing.retry_backoff()).await;
                            }
                        }
                    }
                }
                if let Some(err) = last_error {
                    self.dispose(&batch, &err).await;
                }
                self.commit(&batch).await;
            }
            CommitStrategy::AfterReceive => {
                self.commit(&batch).await;
                if let Err(err) = self.invoke(batch.clone()).await {
                    warn!("{err}");
                    self.dispose(&batch, &err).await;
                }
            }
        }
    }

    async fn invoke(&self, batch: Vec<ConsumeMessage>) -> Result<(), CourierError> {
        let outcome = AssertUnwindSafe(self.handler.handle(batch))
            .catch_unwind()
            .await;
        let source = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err,
            Err(panic) => anyhow::anyhow!("handler panicked: {}", panic_message(&*panic)),
        };
        Err(CourierError::HandlerExecution {
            handler_id: self.handler_id.to_string(),
            source,
        })
    }

    async fn dispose(&self, batch: &[ConsumeMessage], err: &CourierError) {
        let Some(dead_letter_topic) = &self.processing.dead_letter_topic else {
            error!(count = batch.len(), "retries exhausted, dropping messages: {err}");
            return;
        };
        for message in batch {
            if let Err(publish_err) = self
                .transport
                .publish(dead_letter_topic, message.payload().clone())
                .await
            {
                error!(
                    dead_letter_topic = %dead_letter_topic,
                    "could not dead-letter message, dropping it: {publish_err}"
                );
            }
        }
        warn!(count = batch.len(), %dead_letter_topic, "messages dead-lettered");
    }

    async fn commit(&self, batch: &[ConsumeMessage]) {
        if let Err(err) = self.transport.commit(&self.topic, batch).await {
            warn!(count = batch.len(), "commit failed: {err}");
        }
    }
}

#[async_trait]
impl Actor for TopicDispatcher {
    type Message = DispatchCommand;

    async fn handle(
        &mut self,
        command: DispatchCommand,
        ctx: &mut ActorContext<DispatchCommand>,
    ) -> Result<(), ActorError> {
        match command {
            DispatchCommand::Deliver(message) => {
                self.buffer.push(message);
                let threshold = self.processing.effective_batch_size();
                if self.buffer.len() >= threshold {
                    self.flush().await;
                } else if self.buffer.len() == 1 {
                    ctx.schedule_once(
                        self.processing.batch_timeout(),
                        DispatchCommand::FlushDue {
                            generation: self.generation,
                        },
                    );
                }
            }
            DispatchCommand::FlushDue { generation } => {
                if generation == self.generation {
                    trace!(
                        handler = %self.handler_id,
                        topic = %self.topic,
                        "batch timeout elapsed"
                    );
                    self.flush().await;
                }
            }
        }
        Ok(())
    }

    async fn stopped(&mut self, _ctx: &mut ActorContext<DispatchCommand>) {
        if !self.buffer.is_empty() {
            trace!(handler = %self.handler_id, pending = self.buffer.len(), "flushing on stop");
            self.flush().await;
        }
    }
}
