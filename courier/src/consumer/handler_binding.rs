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

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::message::ConsumeMessage;
use crate::traits::MessageHandler;

/// When the dispatch engine acknowledges messages to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitStrategy {
    /// Commit after the handler succeeded, or after the batch was dead-lettered
    /// or dropped once retries ran out.
    #[default]
    AfterSuccessfulProcessing,
    /// Commit before the handler runs. The handler gets a single attempt.
    AfterReceive,
}

/// A handler together with the topics it consumes and how it consumes them.
///
/// Unset batch and retry values fall back to [`MessagingOptions`](crate::common::MessagingOptions)
/// and then to the built-in defaults.
///
/// ```rust,ignore
/// let binding = HandlerBinding::new("invoices", handler_fn(|batch| async move {
///         store(batch).await
///     }))
///     .topic_group("billing")
///     .batch(100, 2_000)
///     .bulk()
///     .dead_letter("billing.dlq");
/// ```
#[derive(Clone)]
pub struct HandlerBinding {
    pub(crate) handler_id: String,
    pub(crate) handler_type: &'static str,
    pub(crate) topics: Vec<String>,
    pub(crate) topic_group: Option<String>,
    pub(crate) consumer_group_id: Option<String>,
    pub(crate) max_batch_size: Option<usize>,
    pub(crate) batch_timeout_ms: Option<u64>,
    pub(crate) is_bulk: bool,
    pub(crate) commit_strategy: CommitStrategy,
    pub(crate) dead_letter_topic: Option<String>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) retry_backoff_ms: Option<u64>,
    pub(crate) handler: Arc<dyn MessageHandler>,
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("handler_id", &self.handler_id)
            .field("handler_type", &self.handler_type)
            .field("topics", &self.topics)
            .field("topic_group", &self.topic_group)
            .field("is_bulk", &self.is_bulk)
            .field("commit_strategy", &self.commit_strategy)
            .finish_non_exhaustive()
    }
}

impl HandlerBinding {
    /// Binds `handler` under a unique id. Add topics before registering it.
    pub fn new<H: MessageHandler>(handler_id: impl Into<String>, handler: H) -> Self {
        Self {
            handler_id: handler_id.into(),
            handler_type: type_name::<H>(),
            topics: Vec::new(),
            topic_group: None,
            consumer_group_id: None,
            max_batch_size: None,
            batch_timeout_ms: None,
            is_bulk: false,
            commit_strategy: CommitStrategy::default(),
            dead_letter_topic: None,
            max_retries: None,
            retry_backoff_ms: None,
            handler: Arc::new(handler),
        }
    }

    /// Adds a topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    /// Adds several topics.
    #[must_use]
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    /// Subscribes to every topic of a named group from the messaging options.
    #[must_use]
    pub fn topic_group(mut self, group: impl Into<String>) -> Self {
        self.topic_group = Some(group.into());
        self
    }

    /// Overrides the consumer group for this binding's subscriptions.
    #[must_use]
    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group_id = Some(group.into());
        self
    }

    /// Sets the batch size and timeout. Only bulk bindings batch.
    #[must_use]
    pub fn batch(mut self, max_batch_size: usize, batch_timeout_ms: u64) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self.batch_timeout_ms = Some(batch_timeout_ms);
        self
    }

    /// Delivers batches instead of single messages.
    #[must_use]
    pub fn bulk(mut self) -> Self {
        self.is_bulk = true;
        self
    }

    /// Chooses when messages are committed.
    #[must_use]
    pub fn commit_strategy(mut self, strategy: CommitStrategy) -> Self {
        self.commit_strategy = strategy;
        self
    }

    /// Forwards messages that exhausted their retries to `topic`.
    #[must_use]
    pub fn dead_letter(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = Some(topic.into());
        self
    }

    /// Retries after the first failed invocation.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Delay between retries.
    #[must_use]
    pub fn retry_backoff(mut self, backoff_ms: u64) -> Self {
        self.retry_backoff_ms = Some(backoff_ms);
        self
    }

    /// The unique handler id.
    #[must_use]
    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    pub(crate) fn has_topic_metadata(&self) -> bool {
        !self.topics.is_empty() || self.topic_group.is_some()
    }
}

/// A named group of bindings registered together.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    name: String,
    bindings: Vec<HandlerBinding>,
}

impl HandlerSet {
    /// An empty set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    /// Adds a binding.
    #[must_use]
    pub fn with(mut self, binding: HandlerBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// The set name, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bindings in registration order.
    #[must_use]
    pub fn bindings(&self) -> &[HandlerBinding] {
        &self.bindings
    }

    pub(crate) fn into_bindings(self) -> Vec<HandlerBinding> {
        self.bindings
    }
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Vec<ConsumeMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, batch: Vec<ConsumeMessage>) -> anyhow::Result<()> {
        (self.f)(batch).await
    }
}

/// Wraps an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> impl MessageHandler
where
    F: Fn(Vec<ConsumeMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnHandler { f }
}

struct JsonHandler<T, F> {
    f: F,
    _payload: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, F, Fut> MessageHandler for JsonHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, batch: Vec<ConsumeMessage>) -> anyhow::Result<()> {
        let decoded = batch
            .iter()
            .map(|message| {
                message.json::<T>().with_context(|| {
                    format!(
                        "payload on '{}' is not a valid {}",
                        message.topic(),
                        type_name::<T>()
                    )
                })
            })
            .collect::<anyhow::Result<Vec<T>>>()?;
        (self.f)(decoded).await
    }
}

/// Wraps an async closure that takes JSON-decoded payloads.
///
/// A payload that does not decode fails the whole batch, which then goes
/// through the binding's retry and dead-letter handling.
pub fn json_handler<T, F, Fut>(f: F) -> impl MessageHandler
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    JsonHandler {
        f,
        _payload: PhantomData,
    }
}
