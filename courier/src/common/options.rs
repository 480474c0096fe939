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

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::common::CourierError;

/// Broker-facing options shared by the handler registry, the dispatch engine,
/// and the publisher.
///
/// ```toml
/// bootstrap_servers = "localhost:9092"
/// consumer_group_id = "billing"
/// dead_letter_topic = "billing.dlq"
///
/// [topic_groups]
/// invoices = ["invoices.created", "invoices.paid"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingOptions {
    /// Broker address. Accepted as `bootstrap_servers` too.
    #[serde(alias = "bootstrap_servers")]
    pub connection_string: String,
    /// Default consumer group for every subscription.
    pub consumer_group_id: String,
    /// Named lists of topics a binding can subscribe to as a unit.
    pub topic_groups: BTreeMap<String, Vec<String>>,
    /// Default batch size for bindings that do not set one.
    pub max_batch_size: usize,
    /// Default batch timeout for bindings that do not set one.
    pub batch_timeout_ms: u64,
    /// Publish retries after the first failed attempt.
    pub retry_count: u32,
    /// Fixed delay between publish attempts.
    pub retry_interval_ms: u64,
    /// Default dead-letter topic for bindings that do not set one.
    pub dead_letter_topic: Option<String>,
}

impl Default for MessagingOptions {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            consumer_group_id: String::new(),
            topic_groups: BTreeMap::new(),
            max_batch_size: 200,
            batch_timeout_ms: 5_000,
            retry_count: 3,
            retry_interval_ms: 1_000,
            dead_letter_topic: None,
        }
    }
}

impl MessagingOptions {
    /// Options with the given connection string and consumer group and defaults elsewhere.
    pub fn new(connection_string: impl Into<String>, consumer_group_id: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            consumer_group_id: consumer_group_id.into(),
            ..Self::default()
        }
    }

    /// Adds or replaces a topic group.
    #[must_use]
    pub fn with_topic_group<I, S>(mut self, name: impl Into<String>, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topic_groups
            .insert(name.into(), topics.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the default batch size and timeout.
    #[must_use]
    pub fn with_batching(mut self, max_batch_size: usize, batch_timeout_ms: u64) -> Self {
        self.max_batch_size = max_batch_size;
        self.batch_timeout_ms = batch_timeout_ms;
        self
    }

    /// Sets the publish retry budget.
    #[must_use]
    pub fn with_retry(mut self, retry_count: u32, retry_interval_ms: u64) -> Self {
        self.retry_count = retry_count;
        self.retry_interval_ms = retry_interval_ms;
        self
    }

    /// Sets the default dead-letter topic.
    #[must_use]
    pub fn with_dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = Some(topic.into());
        self
    }

    /// The fixed delay between publish attempts.
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Checks every rule and reports all violations at once.
    ///
    /// # Errors
    ///
    /// [`CourierError::Configuration`] listing each violation.
    pub fn validate(&self) -> Result<(), CourierError> {
        let mut violations = Vec::new();
        if self.connection_string.trim().is_empty() {
            violations.push("connection string must not be empty".to_string());
        }
        if self.consumer_group_id.trim().is_empty() {
            violations.push("consumer group id must not be empty".to_string());
        }
        for (name, topics) in &self.topic_groups {
            if name.trim().is_empty() {
                violations.push("topic group names must not be empty".to_string());
            }
            if topics.is_empty() {
                violations.push(format!("topic group '{name}' has no topics"));
            }
            let mut seen = HashSet::new();
            for topic in topics {
                if topic.trim().is_empty() {
                    violations.push(format!("topic group '{name}' contains an empty topic"));
                } else if !seen.insert(topic.as_str()) {
                    violations.push(format!("topic group '{name}' lists '{topic}' more than once"));
                }
            }
        }
        if self.max_batch_size == 0 {
            violations.push("max_batch_size must be greater than zero".to_string());
        }
        if self.batch_timeout_ms == 0 {
            violations.push("batch_timeout_ms must be greater than zero".to_string());
        }
        if self
            .dead_letter_topic
            .as_deref()
            .is_some_and(|topic| topic.trim().is_empty())
        {
            violations.push("dead_letter_topic must not be blank when set".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(CourierError::Configuration(violations))
        }
    }

    /// Parses and validates options from TOML text.
    ///
    /// # Errors
    ///
    /// [`CourierError::Configuration`] for parse errors and rule violations.
    pub fn from_toml_str(text: &str) -> Result<Self, CourierError> {
        let options: Self = toml::from_str(text)
            .map_err(|e| CourierError::Configuration(vec![format!("malformed options: {e}")]))?;
        options.validate()?;
        Ok(options)
    }

    /// Reads, parses, and validates options from a TOML file.
    ///
    /// # Errors
    ///
    /// [`CourierError::Configuration`] when the file cannot be read, parsed, or validated.
    #[instrument]
    pub fn load(path: &Path) -> Result<Self, CourierError> {
        info!("Loading messaging options from: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            CourierError::Configuration(vec![format!("cannot read {}: {e}", path.display())])
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_unset_fields() {
        let options = MessagingOptions::new("localhost:9092", "billing");
        assert_eq!(options.max_batch_size, 200);
        assert_eq!(options.batch_timeout_ms, 5_000);
        assert_eq!(options.retry_count, 3);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn bootstrap_servers_is_an_alias() {
        let options = MessagingOptions::from_toml_str(
            r#"
            bootstrap_servers = "broker:9092"
            consumer_group_id = "g"
            "#,
        )
        .expect("valid options");
        assert_eq!(options.connection_string, "broker:9092");
    }

    #[test]
    fn duplicate_group_entries_are_reported() {
        let options = MessagingOptions::new("broker", "g").with_topic_group("orders", ["a", "a"]);
        let err = options.validate().unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert!(err.violations()[0].contains("more than once"));
    }
}
