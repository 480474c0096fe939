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
//! Messaging options and runtime configuration loading.

use std::io::Write;
use std::time::Duration;

use courier::prelude::*;

use crate::setup::*;

mod setup;

/// Validation reports every problem in one error.
#[test]
fn test_options_validation_lists_every_violation() {
    let options = MessagingOptions {
        connection_string: " ".to_string(),
        consumer_group_id: String::new(),
        max_batch_size: 0,
        batch_timeout_ms: 0,
        dead_letter_topic: Some(String::new()),
        ..MessagingOptions::default()
    }
    .with_topic_group("orders", ["a", "", "a"])
    .with_topic_group("empty", Vec::<String>::new());

    let err = options.validate().unwrap_err();
    let violations = err.violations();
    assert_eq!(
        violations,
        [
            "connection string must not be empty",
            "consumer group id must not be empty",
            "topic group 'empty' has no topics",
            "topic group 'orders' contains an empty topic",
            "topic group 'orders' lists 'a' more than once",
            "max_batch_size must be greater than zero",
            "batch_timeout_ms must be greater than zero",
            "dead_letter_topic must not be blank when set",
        ]
    );
}

/// Options load from a TOML file, including topic groups.
#[test]
fn test_options_load_from_file() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"
        connection_string = "broker-1:9092,broker-2:9092"
        consumer_group_id = "billing"
        max_batch_size = 50
        retry_interval_ms = 250
        dead_letter_topic = "billing.dlq"

        [topic_groups]
        invoices = ["invoices.created", "invoices.paid"]
        "#
    )?;

    let options = MessagingOptions::load(file.path())?;
    assert_eq!(options.consumer_group_id, "billing");
    assert_eq!(options.max_batch_size, 50);
    assert_eq!(options.batch_timeout_ms, 5_000);
    assert_eq!(options.retry_interval(), Duration::from_millis(250));
    assert_eq!(
        options.topic_groups["invoices"],
        vec!["invoices.created", "invoices.paid"]
    );
    assert_eq!(options.dead_letter_topic.as_deref(), Some("billing.dlq"));
    Ok(())
}

/// Unreadable, malformed, and invalid files are configuration errors.
#[test]
fn test_options_load_failures() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = MessagingOptions::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(missing.violations()[0].starts_with("cannot read"));

    let malformed = MessagingOptions::from_toml_str("consumer_group_id = ").unwrap_err();
    assert!(malformed.violations()[0].starts_with("malformed options"));

    let invalid = MessagingOptions::from_toml_str(r#"connection_string = "broker""#).unwrap_err();
    assert_eq!(invalid.violations(), ["consumer group id must not be empty"]);
    Ok(())
}

/// Runtime configuration sections are optional and merge with defaults.
#[test]
fn test_runtime_config_parses_partial_toml() -> anyhow::Result<()> {
    let config = CourierConfig::from_toml_str(
        r#"
        [timeouts]
        actor_stop_timeout_ms = 250

        [health]
        interval_ms = 500
        work_timeout_ms = 2000

        [dispatch]
        retry_backoff_ms = 10
        "#,
    )?;

    assert_eq!(config.actor_stop_timeout(), Duration::from_millis(250));
    assert_eq!(config.system_shutdown_timeout(), Duration::from_secs(5));
    assert_eq!(config.health.initial_delay_ms, 30_000);
    assert_eq!(config.health.work_timeout_ms, Some(2_000));
    assert_eq!(config.dispatch.handler_max_retries, 3);

    let settings = CoordinatorSettings::from_config(&config);
    assert_eq!(settings.health_interval, Duration::from_millis(500));
    assert_eq!(settings.work_timeout, Some(Duration::from_secs(2)));
    Ok(())
}

/// A host without a transport, or with invalid options, does not start.
#[tokio::test]
async fn test_host_requires_valid_options_and_transport() -> anyhow::Result<()> {
    let runtime = test_runtime();

    let err = MessagingHost::builder(MessagingOptions::new("memory://local", "g"))
        .start(&runtime)
        .await
        .unwrap_err();
    assert_eq!(err.violations(), ["no transport configured"]);

    let err = MessagingHost::builder(MessagingOptions::new("", "g"))
        .transport(InMemoryTransport::new())
        .start(&runtime)
        .await
        .unwrap_err();
    assert_eq!(err.violations(), ["connection string must not be empty"]);
    assert!(runtime.registry().is_empty());
    Ok(())
}

/// The runtime's publisher policy reaches hosted publishers.
#[tokio::test]
async fn test_host_publisher_uses_runtime_policy() -> anyhow::Result<()> {
    let mut config = CourierConfig::default();
    config.publisher.zero_subscriber_policy = ZeroSubscriberPolicy::Accept;
    let runtime = runtime_with(config);
    let transport = InMemoryTransport::new();
    let host = MessagingHost::builder(MessagingOptions::new("memory://local", "g"))
        .transport(transport.clone())
        .start(&runtime)
        .await?;

    assert!(host.publisher().publish_bytes("hello", "nobody-listens").await);
    assert_eq!(transport.published_to("nobody-listens").len(), 1);

    host.shutdown().await;
    assert!(!host.publisher().publish_bytes("late", "nobody-listens").await);
    runtime.shutdown_all().await;
    Ok(())
}
