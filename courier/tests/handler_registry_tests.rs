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
//! Handler discovery and resolution against messaging options.

use courier::prelude::*;

use crate::setup::*;

mod setup;

fn noop(id: &str) -> HandlerBinding {
    HandlerBinding::new(id, handler_fn(|_batch: Vec<ConsumeMessage>| async { anyhow::Ok(()) }))
}

fn options() -> MessagingOptions {
    MessagingOptions::new("memory://local", "orders-service")
        .with_topic_group("orders", ["orders.created", "orders.cancelled"])
        .with_topic_group("audit", Vec::<String>::new())
}

/// Bindings without topics or a topic group are ignored by set registration.
#[test]
fn test_bindings_without_topics_are_skipped() -> anyhow::Result<()> {
    let mut registry = HandlerRegistry::new(options());
    let added = registry.register(
        HandlerSet::new("mixed")
            .with(noop("bare"))
            .with(noop("direct").topic("payments"))
            .with(noop("grouped").topic_group("orders")),
    )?;

    assert_eq!(added, 2);
    assert!(registry.get("bare").is_none());
    let grouped = registry.get("grouped").expect("grouped handler");
    assert_eq!(grouped.topic_group.as_deref(), Some("orders"));
    assert_eq!(
        registry.topics().into_iter().collect::<Vec<_>>(),
        vec!["payments", "orders.created", "orders.cancelled"]
    );
    Ok(())
}

/// Every broken binding in a set is reported, and none of the set is kept.
#[test]
fn test_violations_are_aggregated() {
    let mut registry = HandlerRegistry::new(options());
    let err = registry
        .register(
            HandlerSet::new("broken")
                .with(noop("fine").topic("payments"))
                .with(noop("missing").topic_group("shipping"))
                .with(noop("empty").topic_group("audit"))
                .with(noop("blank").topic("  ")),
        )
        .unwrap_err();

    let violations = err.violations();
    assert_eq!(violations.len(), 3);
    assert!(violations[0].contains("'shipping', which is not configured"));
    assert!(violations[1].contains("'audit', which is empty"));
    assert!(violations[2].contains("blank topic"));
    assert!(registry.is_empty());
}

/// The first registration of a handler id wins within set registration.
#[test]
fn test_duplicate_handler_ids_keep_the_first() -> anyhow::Result<()> {
    let mut registry = HandlerRegistry::new(options());
    registry.register(HandlerSet::new("first").with(noop("h").topic("a")))?;
    let added = registry.register(HandlerSet::new("second").with(noop("h").topic("b")))?;

    assert_eq!(added, 0);
    assert_eq!(registry.len(), 1);
    assert!(registry.get("h").expect("registered").topics.contains("a"));
    Ok(())
}

/// Registering a single binding under a taken id is a conflict.
#[test]
fn test_register_handler_rejects_duplicates() -> anyhow::Result<()> {
    let mut registry = HandlerRegistry::new(options());
    registry.register_handler(noop("h").topic("a"))?;

    let err = registry.register_handler(noop("h").topic("b")).unwrap_err();
    assert!(matches!(
        err,
        CourierError::RegistrationConflict { ref kind, ref name }
            if kind == "handler" && name == "h"
    ));

    let err = registry.register_handler(noop("no-topics")).unwrap_err();
    assert!(matches!(err, CourierError::Configuration(_)));
    Ok(())
}

/// Unset values come from the options, then from the dispatch defaults.
#[test]
fn test_processing_defaults_fall_back_in_order() -> anyhow::Result<()> {
    let options = options()
        .with_batching(25, 750)
        .with_dead_letter_topic("everything.dlq");
    let mut registry = HandlerRegistry::new(options).with_dispatch_defaults(DispatchConfig {
        handler_max_retries: 7,
        retry_backoff_ms: 40,
    });
    registry.register_handler(noop("defaults").topic("a"))?;
    registry.register_handler(
        noop("explicit")
            .topic("b")
            .bulk()
            .batch(5, 50)
            .max_retries(1)
            .retry_backoff(2)
            .dead_letter("b.dlq")
            .consumer_group("auditors")
            .commit_strategy(CommitStrategy::AfterReceive),
    )?;

    let defaults = &registry.get("defaults").expect("registered").processing;
    assert_eq!(
        *defaults,
        ProcessingConfig {
            max_batch_size: 25,
            batch_timeout_ms: 750,
            is_bulk: false,
            commit_strategy: CommitStrategy::AfterSuccessfulProcessing,
            dead_letter_topic: Some("everything.dlq".to_string()),
            max_retries: 7,
            retry_backoff_ms: 40,
        }
    );
    assert_eq!(defaults.effective_batch_size(), 1);

    let explicit = registry.get("explicit").expect("registered");
    assert_eq!(explicit.consumer_group_id.as_deref(), Some("auditors"));
    assert_eq!(explicit.processing.effective_batch_size(), 5);
    assert_eq!(explicit.processing.dead_letter_topic.as_deref(), Some("b.dlq"));
    assert_eq!(explicit.processing.commit_strategy, CommitStrategy::AfterReceive);
    assert_eq!((explicit.processing.max_retries, explicit.processing.retry_backoff_ms), (1, 2));
    Ok(())
}

/// The host refuses to start when a binding does not resolve.
#[tokio::test]
async fn test_host_start_fails_on_unresolved_binding() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let transport = InMemoryTransport::new();
    let options = MessagingOptions::new("memory://local", "orders-service")
        .with_topic_group("orders", ["orders.created"]);
    let result = MessagingHost::builder(options)
        .transport(transport.clone())
        .handler(noop("missing").topic_group("shipping"))
        .start(&runtime)
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, CourierError::Configuration(_)));
    assert_eq!(transport.subscription_count("orders.created"), 0);
    assert!(!runtime
        .registry()
        .contains(&ActorKey::new("publisher", "default")));
    runtime.shutdown_all().await;
    Ok(())
}
