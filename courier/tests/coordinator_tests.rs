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
//! Round-robin work distribution, completion tracking, and worker health checks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier::prelude::*;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::setup::*;

mod setup;

struct Doubler {
    id: WorkerId,
    seen: Arc<Mutex<Vec<(WorkerId, u32)>>>,
}

#[async_trait]
impl WorkerBehavior for Doubler {
    type Item = u32;
    type Output = u32;

    async fn process(&mut self, item: u32, ticket: WorkTicket<u32>) -> Result<(), ActorError> {
        self.seen.lock().push((self.id, item));
        ticket.complete(item * 2);
        Ok(())
    }
}

struct Sleeper;

#[async_trait]
impl WorkerBehavior for Sleeper {
    type Item = Duration;
    type Output = ();

    async fn process(&mut self, nap: Duration, ticket: WorkTicket<()>) -> Result<(), ActorError> {
        tokio::time::sleep(nap).await;
        ticket.complete(());
        Ok(())
    }
}

struct Refuser;

#[async_trait]
impl WorkerBehavior for Refuser {
    type Item = u32;
    type Output = u32;

    async fn process(&mut self, item: u32, _ticket: WorkTicket<u32>) -> Result<(), ActorError> {
        if item % 2 == 0 {
            Err(ActorError::transient(anyhow::anyhow!("cannot take {item}")))
        } else {
            panic!("cannot take {item}");
        }
    }
}

struct CountAbandoned {
    abandoned: Arc<Mutex<Vec<WorkId>>>,
}

impl CoordinatorBehavior<u32> for CountAbandoned {
    fn on_work_abandoned(&mut self, work_id: WorkId, _worker: WorkerId) {
        self.abandoned.lock().push(work_id);
    }
}

fn fast_health_checks() -> CoordinatorSettings {
    CoordinatorSettings::default()
        .with_health_check(Duration::from_millis(20), Duration::from_millis(20))
        .with_worker_stop_timeout(Duration::from_millis(50))
}

/// Work is spread evenly and every result reaches its recipient.
#[tokio::test]
async fn test_work_is_distributed_round_robin() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_workers = seen.clone();
    let coordinator = Coordinator::new(
        "doublers",
        3,
        move |id| Doubler {
            id,
            seen: seen_by_workers.clone(),
        },
        ForwardCompletions,
    )
    .spawn(&runtime);
    coordinator.initialize();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let results = Recipient::from_channel("results", tx);
    for item in 0..9 {
        coordinator.distribute_work_to(item, results.clone());
    }

    let mut outputs = Vec::new();
    for _ in 0..9 {
        let completed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await?
            .expect("result");
        outputs.push(completed.result);
    }
    outputs.sort_unstable();
    assert_eq!(outputs, (0..9).map(|n| n * 2).collect::<Vec<_>>());

    for worker in 0..3 {
        let items: Vec<u32> = seen
            .lock()
            .iter()
            .filter(|(id, _)| id.index() == worker)
            .map(|(_, item)| *item)
            .collect();
        assert_eq!(items.len(), 3, "worker {worker} got {items:?}");
        assert!(items.iter().all(|item| item % 3 == worker as u32));
    }

    let status = coordinator.status().await.expect("running");
    assert_eq!(status.workers, 3);
    assert_eq!(status.in_flight, 0);
    coordinator.stop(Duration::from_secs(1)).await;
    Ok(())
}

/// Without workers, distributed work is dropped instead of tracked.
#[tokio::test]
async fn test_work_without_workers_is_dropped() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let coordinator = Coordinator::new("empty", 0, |_| Sleeper, LogCompletions).spawn(&runtime);
    coordinator.initialize();
    coordinator.distribute_work(Duration::ZERO);

    let status = coordinator.status().await.expect("running");
    assert_eq!(status, CoordinatorStatus::default());
    coordinator.stop(Duration::from_secs(1)).await;
    Ok(())
}

/// Work handed out before initialization is dropped; work afterwards is tracked until done.
#[tokio::test]
async fn test_in_flight_work_is_tracked_until_completed() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let coordinator = Coordinator::new("nappers", 1, |_| Sleeper, LogCompletions).spawn(&runtime);
    coordinator.distribute_work(Duration::ZERO);
    coordinator.initialize();
    coordinator.distribute_work(Duration::from_millis(100));

    let status = coordinator.status().await.expect("running");
    assert_eq!(status.workers, 1);
    assert_eq!(status.in_flight, 1);

    let probe = coordinator.clone();
    assert!(
        eventually(Duration::from_secs(1), || {
            let probe = probe.clone();
            async move { probe.status().await.is_some_and(|status| status.in_flight == 0) }
        })
        .await
    );
    coordinator.stop(Duration::from_secs(1)).await;
    Ok(())
}

struct CountUnresponsive {
    reports: Arc<AtomicUsize>,
    decision: HealthDecision,
}

impl CoordinatorBehavior<()> for CountUnresponsive {
    fn on_worker_unresponsive(&mut self, _worker: WorkerId) -> HealthDecision {
        self.reports.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}

/// A worker that never answers is pinged once and then only reported.
#[tokio::test]
async fn test_unanswered_ping_is_not_repeated() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let reports = Arc::new(AtomicUsize::new(0));
    let coordinator = Coordinator::new(
        "stuck",
        1,
        |_| Sleeper,
        CountUnresponsive {
            reports: reports.clone(),
            decision: HealthDecision::Keep,
        },
    )
    .with_settings(fast_health_checks())
    .spawn(&runtime);
    coordinator.initialize();
    coordinator.distribute_work(Duration::from_secs(30));

    let probe = reports.clone();
    assert!(
        eventually(Duration::from_secs(2), || {
            let probe = probe.clone();
            async move { probe.load(Ordering::SeqCst) >= 3 }
        })
        .await
    );
    let status = coordinator.status().await.expect("running");
    assert_eq!(status.pings_sent, 1);
    assert_eq!(status.awaiting_pong, 1);
    assert_eq!(status.workers, 1);
    coordinator.stop(Duration::from_secs(1)).await;
    Ok(())
}

/// A responsive worker answers every ping and is never reported.
#[tokio::test]
async fn test_responsive_workers_are_not_reported() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let reports = Arc::new(AtomicUsize::new(0));
    let coordinator = Coordinator::new(
        "healthy",
        2,
        |_| Sleeper,
        CountUnresponsive {
            reports: reports.clone(),
            decision: HealthDecision::Remove,
        },
    )
    .with_settings(fast_health_checks())
    .spawn(&runtime);
    coordinator.initialize();

    let probe = coordinator.clone();
    assert!(
        eventually(Duration::from_secs(2), || {
            let probe = probe.clone();
            async move { probe.status().await.is_some_and(|status| status.pings_sent >= 6) }
        })
        .await
    );
    assert_eq!(reports.load(Ordering::SeqCst), 0);
    assert_eq!(coordinator.status().await.expect("running").workers, 2);
    coordinator.stop(Duration::from_secs(1)).await;
    Ok(())
}

/// A removal decision takes the worker out of the rotation.
#[tokio::test]
async fn test_unresponsive_worker_can_be_removed() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let reports = Arc::new(AtomicUsize::new(0));
    let coordinator = Coordinator::new(
        "pruned",
        2,
        |_| Sleeper,
        CountUnresponsive {
            reports: reports.clone(),
            decision: HealthDecision::Remove,
        },
    )
    .with_settings(fast_health_checks())
    .spawn(&runtime);
    coordinator.initialize();
    coordinator.distribute_work(Duration::from_secs(30));

    let probe = coordinator.clone();
    assert!(
        eventually(Duration::from_secs(2), || {
            let probe = probe.clone();
            async move { probe.status().await.is_some_and(|status| status.workers == 1) }
        })
        .await
    );
    assert_eq!(reports.load(Ordering::SeqCst), 1);
    coordinator.stop(Duration::from_secs(1)).await;
    Ok(())
}

/// Work older than the work timeout is expired on the next health check.
#[tokio::test]
async fn test_expired_work_is_swept() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let coordinator = Coordinator::new("slow", 1, |_| Sleeper, LogCompletions)
        .with_settings(fast_health_checks().with_work_timeout(Duration::from_millis(30)))
        .spawn(&runtime);
    coordinator.initialize();
    coordinator.distribute_work(Duration::from_secs(30));

    let probe = coordinator.clone();
    assert!(
        eventually(Duration::from_secs(2), || {
            let probe = probe.clone();
            async move { probe.status().await.is_some_and(|status| status.in_flight == 0) }
        })
        .await
    );
    coordinator.stop(Duration::from_secs(1)).await;
    Ok(())
}

/// Items whose worker fails or panics stop being tracked without a work timeout.
#[tokio::test]
async fn test_failed_work_is_released() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let abandoned = Arc::new(Mutex::new(Vec::new()));
    let coordinator = Coordinator::new(
        "refusers",
        1,
        |_| Refuser,
        CountAbandoned {
            abandoned: abandoned.clone(),
        },
    )
    .with_settings(fast_health_checks())
    .spawn(&runtime);
    coordinator.initialize();
    coordinator.distribute_work(2);
    coordinator.distribute_work(3);

    let probe = coordinator.clone();
    assert!(
        eventually(Duration::from_secs(2), || {
            let probe = probe.clone();
            async move { probe.status().await.is_some_and(|status| status.in_flight == 0) }
        })
        .await
    );
    let mut ids: Vec<u64> = abandoned.lock().iter().map(|id| id.value()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1]);
    assert_eq!(coordinator.status().await.expect("running").workers, 1);
    coordinator.stop(Duration::from_secs(1)).await;
    Ok(())
}

/// Work held by a removed worker is released when the worker stops.
#[tokio::test]
async fn test_work_of_removed_worker_is_released() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let reports = Arc::new(AtomicUsize::new(0));
    let coordinator = Coordinator::new(
        "evicted",
        1,
        |_| Sleeper,
        CountUnresponsive {
            reports: reports.clone(),
            decision: HealthDecision::Remove,
        },
    )
    .with_settings(fast_health_checks())
    .spawn(&runtime);
    coordinator.initialize();
    coordinator.distribute_work(Duration::from_secs(30));
    coordinator.distribute_work(Duration::from_secs(30));

    let probe = coordinator.clone();
    assert!(
        eventually(Duration::from_secs(2), || {
            let probe = probe.clone();
            async move {
                probe
                    .status()
                    .await
                    .is_some_and(|status| status.workers == 0 && status.in_flight == 0)
            }
        })
        .await
    );
    coordinator.stop(Duration::from_secs(1)).await;
    Ok(())
}
