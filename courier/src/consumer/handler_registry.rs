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
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use tracing::{instrument, trace, warn};

use crate::common::config::DispatchConfig;
use crate::common::{CourierError, MessagingOptions};
use crate::consumer::{CommitStrategy, HandlerBinding, HandlerSet};
use crate::traits::MessageHandler;

/// How a consumer's messages are batched, retried, and acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingConfig {
    /// Messages per batch for bulk consumers.
    pub max_batch_size: usize,
    /// Age of the oldest buffered message that forces a flush.
    pub batch_timeout_ms: u64,
    /// Whether the handler receives batches.
    pub is_bulk: bool,
    /// When messages are committed.
    pub commit_strategy: CommitStrategy,
    /// Where exhausted messages are forwarded.
    pub dead_letter_topic: Option<String>,
    /// Retries after the first failed invocation.
    pub max_retries: u32,
    /// Delay between retries.
    pub retry_backoff_ms: u64,
}

impl ProcessingConfig {
    /// Buffered messages that trigger a flush.
    #[must_use]
    pub const fn effective_batch_size(&self) -> usize {
        if self.is_bulk {
            self.max_batch_size
        } else {
            1
        }
    }

    /// The batch timeout.
    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// The retry delay.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// A registered handler with its resolved topics.
#[derive(Clone)]
pub struct ConsumerMetadata {
    /// Unique handler id.
    pub handler_id: String,
    /// Type name of the bound handler.
    pub bound_type: &'static str,
    /// The handler.
    pub handler: Arc<dyn MessageHandler>,
    /// Resolved topics in declaration order. Never empty.
    pub topics: IndexSet<String>,
    /// The topic group the binding referenced, if any.
    pub topic_group: Option<String>,
    /// Consumer group override.
    pub consumer_group_id: Option<String>,
    /// Batching, retry, and commit settings.
    pub processing: ProcessingConfig,
}

impl fmt::Debug for ConsumerMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerMetadata")
            .field("handler_id", &self.handler_id)
            .field("bound_type", &self.bound_type)
            .field("topics", &self.topics)
            .field("topic_group", &self.topic_group)
            .field("consumer_group_id", &self.consumer_group_id)
            .field("processing", &self.processing)
            .finish_non_exhaustive()
    }
}

/// The table of consumers, built at startup from handler sets.
///
/// Values missing on a binding come from the [`MessagingOptions`], then from
/// the dispatch defaults of the runtime configuration.
#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    options: MessagingOptions,
    defaults: DispatchConfig,
    consumers: IndexMap<String, ConsumerMetadata>,
}

impl HandlerRegistry {
    /// An empty registry resolving against `options`.
    #[must_use]
    pub fn new(options: MessagingOptions) -> Self {
        Self {
            options,
            defaults: DispatchConfig::default(),
            consumers: IndexMap::new(),
        }
    }

    /// Uses explicit retry defaults.
    #[must_use]
    pub fn with_dispatch_defaults(mut self, defaults: DispatchConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Registers every binding of `set` that carries topic metadata.
    ///
    /// Bindings without topics are skipped. A handler id that is already
    /// registered is skipped with a warning; the first registration wins.
    /// Returns the number of consumers added.
    ///
    /// # Errors
    ///
    /// [`CourierError::Configuration`] listing every binding that references
    /// a missing or empty topic group, or resolves to a blank topic. Nothing
    /// from the set is registered in that case.
    #[instrument(skip(self, set), fields(set = %set.name()))]
    pub fn register(&mut self, set: HandlerSet) -> Result<usize, CourierError> {
        let mut violations = Vec::new();
        let mut resolved = Vec::new();
        for binding in set.into_bindings() {
            if !binding.has_topic_metadata() {
                trace!(handler = %binding.handler_id, "no topic metadata, skipping");
                continue;
            }
            match self.resolve(binding) {
                Ok(metadata) => resolved.push(metadata),
                Err(mut errors) => violations.append(&mut errors),
            }
        }
        if !violations.is_empty() {
            return Err(CourierError::Configuration(violations));
        }

        let mut added = 0;
        for metadata in resolved {
            if self.consumers.contains_key(&metadata.handler_id) {
                warn!(
                    handler = %metadata.handler_id,
                    "handler id already registered, keeping the first registration"
                );
                continue;
            }
            trace!(
                handler = %metadata.handler_id,
                topics = ?metadata.topics,
                "consumer registered"
            );
            self.consumers.insert(metadata.handler_id.clone(), metadata);
            added += 1;
        }
        Ok(added)
    }

    /// Registers a single binding.
    ///
    /// # Errors
    ///
    /// * [`CourierError::RegistrationConflict`] when the handler id is taken.
    /// * [`CourierError::Configuration`] when the binding has no topics or
    ///   fails to resolve.
    pub fn register_handler(&mut self, binding: HandlerBinding) -> Result<(), CourierError> {
        if self.consumers.contains_key(&binding.handler_id) {
            return Err(CourierError::RegistrationConflict {
                kind: "handler".to_string(),
                name: binding.handler_id,
            });
        }
        if !binding.has_topic_metadata() {
            return Err(CourierError::Configuration(vec![format!(
                "handler '{}' has no topics",
                binding.handler_id
            )]));
        }
        let metadata = self.resolve(binding).map_err(CourierError::Configuration)?;
        self.consumers.insert(metadata.handler_id.clone(), metadata);
        Ok(())
    }

    /// Looks up a consumer by handler id.
    #[must_use]
    pub fn get(&self, handler_id: &str) -> Option<&ConsumerMetadata> {
        self.consumers.get(handler_id)
    }

    /// Consumers in registration order.
    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerMetadata> {
        self.consumers.values()
    }

    /// Every distinct resolved topic, in first-seen order.
    #[must_use]
    pub fn topics(&self) -> IndexSet<String> {
        self.consumers
            .values()
            .flat_map(|consumer| consumer.topics.iter().cloned())
            .collect()
    }

    /// The options bindings resolve against.
    #[must_use]
    pub const fn options(&self) -> &MessagingOptions {
        &self.options
    }

    /// Number of consumers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether no consumer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    fn resolve(&self, binding: HandlerBinding) -> Result<ConsumerMetadata, Vec<String>> {
        let id = &binding.handler_id;
        let mut violations = Vec::new();
        let mut topics = IndexSet::new();

        for topic in &binding.topics {
            if topic.trim().is_empty() {
                violations.push(format!("handler '{id}' declares a blank topic"));
            } else {
                topics.insert(topic.clone());
            }
        }
        if let Some(group) = &binding.topic_group {
            match self.options.topic_groups.get(group) {
                None => violations.push(format!(
                    "handler '{id}' references topic group '{group}', which is not configured"
                )),
                Some(members) if members.is_empty() => violations.push(format!(
                    "handler '{id}' references topic group '{group}', which is empty"
                )),
                Some(members) => {
                    for topic in members {
                        if topic.trim().is_empty() {
                            violations.push(format!(
                                "topic group '{group}' used by handler '{id}' \
                                 contains a blank topic"
                            ));
                        } else {
                            topics.insert(topic.clone());
                        }
                    }
                }
            }
        }

        let max_batch_size = binding.max_batch_size.unwrap_or(self.options.max_batch_size);
        let batch_timeout_ms = binding
            .batch_timeout_ms
            .unwrap_or(self.options.batch_timeout_ms);
        if max_batch_size == 0 {
            violations.push(format!("handler '{id}' has a zero max_batch_size"));
        }
        if batch_timeout_ms == 0 {
            violations.push(format!("handler '{id}' has a zero batch_timeout_ms"));
        }
        if binding
            .dead_letter_topic
            .as_deref()
            .is_some_and(|topic| topic.trim().is_empty())
        {
            violations.push(format!("handler '{id}' has a blank dead-letter topic"));
        }
        if topics.is_empty() && violations.is_empty() {
            violations.push(format!("handler '{id}' resolves to no topics"));
        }
        if !violations.is_empty() {
            return Err(violations);
        }

        let processing = ProcessingConfig {
            max_batch_size,
            batch_timeout_ms,
            is_bulk: binding.is_bulk,
            commit_strategy: binding.commit_strategy,
            dead_letter_topic: binding
                .dead_letter_topic
                .or_else(|| self.options.dead_letter_topic.clone()),
            max_retries: binding
                .max_retries
                .unwrap_or(self.defaults.handler_max_retries),
            retry_backoff_ms: binding
                .retry_backoff_ms
                .unwrap_or(self.defaults.retry_backoff_ms),
        };
        Ok(ConsumerMetadata {
            handler_id: binding.handler_id,
            bound_type: binding.handler_type,
            handler: binding.handler,
            topics,
            topic_group: binding.topic_group,
            consumer_group_id: binding.consumer_group_id,
            processing,
        })
    }
}
