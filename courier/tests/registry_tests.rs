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
//! Keyed registration, lookup, pools, and runtime shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier::prelude::*;
use parking_lot::Mutex;

use crate::setup::*;

mod setup;

type Log = Arc<Mutex<Vec<(usize, u32)>>>;

struct Member {
    id: usize,
    log: Log,
}

#[async_trait]
impl Actor for Member {
    type Message = u32;

    async fn handle(&mut self, n: u32, _ctx: &mut ActorContext<u32>) -> Result<(), ActorError> {
        self.log.lock().push((self.id, n));
        Ok(())
    }
}

fn member_factory(log: &Log) -> (impl Fn() -> Member + Send + Sync + 'static, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let log = log.clone();
    let factory = move || Member {
        id: counter.fetch_add(1, Ordering::SeqCst),
        log: log.clone(),
    };
    (factory, builds)
}

/// A second registration under the same key fails and leaves the first untouched.
#[tokio::test]
async fn test_duplicate_registration_is_rejected() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let log: Log = Arc::default();
    let (first_factory, first_builds) = member_factory(&log);
    let (second_factory, second_builds) = member_factory(&log);

    let first = runtime.register(
        "svc",
        "orders",
        ActorRegistration::singleton(),
        first_factory,
    )?;
    let duplicate = runtime.register(
        "svc",
        "orders",
        ActorRegistration::singleton(),
        second_factory,
    );

    assert!(matches!(
        duplicate,
        Err(CourierError::RegistrationConflict { ref kind, ref name })
            if kind == "svc" && name == "orders"
    ));
    assert_eq!(first_builds.load(Ordering::SeqCst), 1);
    assert_eq!(second_builds.load(Ordering::SeqCst), 0);

    let resolved = runtime.resolve::<u32>("svc", "orders")?;
    resolved.send(42);
    assert_eq!(first.stop(Duration::from_secs(1)).await, StopOutcome::Graceful);
    assert_eq!(*log.lock(), vec![(0, 42)]);
    assert_eq!(runtime.registry().len(), 1);
    Ok(())
}

/// Lookups distinguish unknown keys from the wrong message type.
#[tokio::test]
async fn test_resolve_reports_missing_and_mismatched() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let log: Log = Arc::default();
    let (factory, _) = member_factory(&log);
    runtime.register("svc", "typed", ActorRegistration::singleton(), factory)?;

    assert!(matches!(
        runtime.resolve::<u32>("svc", "missing"),
        Err(CourierError::NotFound { .. })
    ));
    assert!(matches!(
        runtime.resolve::<String>("svc", "typed"),
        Err(CourierError::TypeMismatch { .. })
    ));
    assert!(runtime.resolve::<u32>("svc", "typed").is_ok());
    runtime.shutdown_all().await;
    Ok(())
}

/// Pools must start below their upper bound.
#[tokio::test]
async fn test_pool_shape_is_validated() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let log: Log = Arc::default();

    let (factory, builds) = member_factory(&log);
    let full = runtime.register("pool", "full", ActorRegistration::pooled(3, 3), factory);
    assert!(matches!(full, Err(CourierError::InvalidRegistration(_))));
    assert_eq!(builds.load(Ordering::SeqCst), 0);

    let (factory, _) = member_factory(&log);
    let empty = runtime.register("pool", "empty", ActorRegistration::pooled(0, 2), factory);
    assert!(matches!(empty, Err(CourierError::InvalidRegistration(_))));
    assert!(runtime.registry().is_empty());
    Ok(())
}

/// A round-robin pool spreads messages evenly over its members.
#[tokio::test]
async fn test_pool_routes_round_robin() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let log: Log = Arc::default();
    let (factory, builds) = member_factory(&log);
    let pool = runtime.register("pool", "workers", ActorRegistration::pooled(3, 5), factory)?;
    assert_eq!(builds.load(Ordering::SeqCst), 3);
    assert_eq!(
        pool.as_pool().expect("pooled").routees()[1].key(),
        &ActorKey::new("pool", "workers-1")
    );

    for n in 0..9 {
        pool.send(n);
    }
    assert_eq!(pool.stop(Duration::from_secs(1)).await, StopOutcome::Graceful);

    let log = log.lock();
    for member in 0..3 {
        let handled: Vec<u32> = log
            .iter()
            .filter(|(id, _)| *id == member)
            .map(|(_, n)| *n)
            .collect();
        assert_eq!(handled.len(), 3, "member {member} handled {handled:?}");
    }
    Ok(())
}

/// Pools resize within `1..=upper_bound` only.
#[tokio::test]
async fn test_pool_resize_respects_bounds() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let log: Log = Arc::default();
    let (factory, builds) = member_factory(&log);
    let address = runtime.register("pool", "elastic", ActorRegistration::pooled(2, 4), factory)?;
    let pool = address.as_pool().expect("pooled");
    let grace = Duration::from_secs(1);

    pool.resize(4, grace).await?;
    assert_eq!(pool.size(), 4);
    assert_eq!(builds.load(Ordering::SeqCst), 4);

    assert!(matches!(
        pool.resize(5, grace).await,
        Err(CourierError::InvalidRegistration(_))
    ));
    assert!(pool.resize(0, grace).await.is_err());

    let removed = pool.routees().split_off(1);
    pool.resize(1, grace).await?;
    assert_eq!(pool.size(), 1);
    assert!(removed
        .iter()
        .all(|member| member.state() == ActorState::Stopped));
    runtime.shutdown_all().await;
    Ok(())
}

/// Unregistering stops the actor and frees the key.
#[tokio::test]
async fn test_unregister_stops_and_frees_the_key() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let log: Log = Arc::default();
    let (factory, _) = member_factory(&log);
    let address = runtime.register("svc", "temp", ActorRegistration::singleton(), factory)?;

    assert_eq!(runtime.unregister("svc", "temp").await?, StopOutcome::Graceful);
    assert!(!runtime.registry().contains(&ActorKey::new("svc", "temp")));
    assert!(address.try_send(1).is_err());
    assert!(matches!(
        runtime.unregister("svc", "temp").await,
        Err(CourierError::NotFound { .. })
    ));

    let (factory, _) = member_factory(&log);
    assert!(runtime
        .register("svc", "temp", ActorRegistration::singleton(), factory)
        .is_ok());
    runtime.shutdown_all().await;
    Ok(())
}

/// Runtime shutdown stops every registration and cancels the root token.
#[tokio::test]
async fn test_shutdown_all_stops_every_registration() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let log: Log = Arc::default();
    let (single, _) = member_factory(&log);
    let (pooled, _) = member_factory(&log);
    let a = runtime.register("svc", "a", ActorRegistration::singleton(), single)?;
    let b = runtime.register("svc", "b", ActorRegistration::pooled(2, 3), pooled)?;
    a.send(1);
    b.send(2);

    let summary = runtime.shutdown_all().await;
    assert!(summary.is_clean());
    assert_eq!(summary.graceful, 2);
    assert!(runtime.is_terminated());
    assert!(a.as_handle().expect("singleton").state() == ActorState::Stopped);
    assert_eq!(log.lock().len(), 2);
    Ok(())
}
