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
//! Mailbox ordering, lifecycle, stop outcomes, and timers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier::prelude::*;
use parking_lot::Mutex;

use crate::setup::*;

mod setup;

struct Recorder {
    seen: Arc<Mutex<Vec<u32>>>,
    delay: Duration,
}

#[async_trait]
impl Actor for Recorder {
    type Message = u32;

    async fn handle(&mut self, n: u32, _ctx: &mut ActorContext<u32>) -> Result<(), ActorError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen.lock().push(n);
        Ok(())
    }
}

fn recorder(delay: Duration) -> (Recorder, Arc<Mutex<Vec<u32>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    (
        Recorder {
            seen: seen.clone(),
            delay,
        },
        seen,
    )
}

/// Messages from one sender are handled in send order.
#[tokio::test]
async fn test_mailbox_preserves_send_order() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let (actor, seen) = recorder(Duration::ZERO);
    let handle = runtime.spawn_actor(ActorConfig::named("recorder", "ordered"), actor);

    for n in 0..100 {
        handle.send(n);
    }
    assert_eq!(handle.stop(Duration::from_secs(1)).await, StopOutcome::Graceful);
    assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    Ok(())
}

/// Each sender's messages keep their order when several tasks share a mailbox.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_keep_their_own_order() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let (actor, seen) = recorder(Duration::ZERO);
    let handle = runtime.spawn_actor(ActorConfig::named("recorder", "shared"), actor);

    let senders: Vec<_> = (0..4_u32)
        .map(|sender| {
            let handle = handle.clone();
            tokio::spawn(async move {
                for seq in 0..250_u32 {
                    handle.send(sender * 1_000 + seq);
                    if seq % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for sender in futures::future::join_all(senders).await {
        sender?;
    }
    assert_eq!(handle.stop(Duration::from_secs(2)).await, StopOutcome::Graceful);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1_000);
    for sender in 0..4_u32 {
        let received: Vec<u32> = seen
            .iter()
            .filter(|n| **n / 1_000 == sender)
            .map(|n| n % 1_000)
            .collect();
        assert_eq!(received, (0..250).collect::<Vec<_>>(), "sender {sender}");
    }
    Ok(())
}

/// A graceful stop processes everything queued before it.
#[tokio::test]
async fn test_graceful_stop_drains_queued_messages() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let (actor, seen) = recorder(Duration::from_millis(5));
    let handle = runtime.spawn_actor(ActorConfig::named("recorder", "draining"), actor);

    for n in 0..10 {
        handle.send(n);
    }
    let outcome = handle.stop(Duration::from_secs(2)).await;
    assert_eq!(outcome, StopOutcome::Graceful);
    assert_eq!(seen.lock().len(), 10);
    assert_eq!(handle.state(), ActorState::Stopped);
    assert!(handle.try_send(99).is_err());
    Ok(())
}

/// An actor stuck in a handler is cancelled once the stop timeout elapses.
#[tokio::test]
async fn test_stuck_actor_is_forced_to_stop() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let (actor, seen) = recorder(Duration::from_secs(30));
    let handle = runtime.spawn_actor(ActorConfig::named("recorder", "stuck"), actor);

    handle.send(1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let outcome = handle.stop(Duration::from_millis(50)).await;
    assert_eq!(outcome, StopOutcome::Forced);
    assert!(seen.lock().is_empty());
    assert_eq!(handle.state(), ActorState::Stopped);
    Ok(())
}

/// Stopping an actor twice reports that it was already stopped.
#[tokio::test]
async fn test_second_stop_reports_already_stopped() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let (actor, _) = recorder(Duration::ZERO);
    let handle = runtime.spawn_actor(ActorConfig::named("recorder", "twice"), actor);

    assert_eq!(handle.stop(Duration::from_secs(1)).await, StopOutcome::Graceful);
    assert_eq!(
        handle.stop(Duration::from_secs(1)).await,
        StopOutcome::AlreadyStopped
    );
    Ok(())
}

#[derive(Debug)]
enum TickerMessage {
    Tick,
    Stop,
}

struct Ticker {
    ticks: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

#[async_trait]
impl Actor for Ticker {
    type Message = TickerMessage;

    async fn started(&mut self, ctx: &mut ActorContext<TickerMessage>) -> Result<(), ActorError> {
        ctx.schedule_repeating(Duration::ZERO, Duration::from_millis(10), || TickerMessage::Tick);
        Ok(())
    }

    async fn handle(
        &mut self,
        message: TickerMessage,
        ctx: &mut ActorContext<TickerMessage>,
    ) -> Result<(), ActorError> {
        match message {
            TickerMessage::Tick => {
                self.ticks.fetch_add(1, Ordering::SeqCst);
            }
            TickerMessage::Stop => ctx.stop_self(),
        }
        Ok(())
    }

    async fn stopped(&mut self, _ctx: &mut ActorContext<TickerMessage>) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Repeating timers deliver until the actor stops, then go quiet.
#[tokio::test]
async fn test_repeating_timer_dies_with_the_actor() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let ticks = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));
    let handle = runtime.spawn_actor(
        ActorConfig::named("ticker", "repeating"),
        Ticker {
            ticks: ticks.clone(),
            stopped: stopped.clone(),
        },
    );

    let ticks_probe = ticks.clone();
    assert!(
        eventually(Duration::from_secs(2), || {
            let ticks = ticks_probe.clone();
            async move { ticks.load(Ordering::SeqCst) >= 3 }
        })
        .await
    );

    handle.send(TickerMessage::Stop);
    let stopped_probe = stopped.clone();
    assert!(
        eventually(Duration::from_secs(2), || {
            let stopped = stopped_probe.clone();
            async move { stopped.load(Ordering::SeqCst) == 1 }
        })
        .await
    );
    assert_eq!(handle.state(), ActorState::Stopped);

    let after_stop = ticks.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    Ok(())
}

struct Echo {
    replies: Recipient<String>,
}

#[async_trait]
impl Actor for Echo {
    type Message = String;

    async fn started(&mut self, ctx: &mut ActorContext<String>) -> Result<(), ActorError> {
        ctx.schedule_once(Duration::from_millis(20), "scheduled".to_string());
        Ok(())
    }

    async fn handle(
        &mut self,
        text: String,
        _ctx: &mut ActorContext<String>,
    ) -> Result<(), ActorError> {
        self.replies.send(text);
        Ok(())
    }
}

/// One-shot timers fire once, after direct messages sent earlier.
#[tokio::test]
async fn test_schedule_once_delivers_after_delay() -> anyhow::Result<()> {
    let runtime = test_runtime();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = runtime.spawn_actor(
        ActorConfig::named("echo", "timer"),
        Echo {
            replies: Recipient::from_channel("replies", tx),
        },
    );

    let direct: Recipient<String> = handle.recipient();
    direct.send("direct".to_string());

    assert_eq!(rx.recv().await.as_deref(), Some("direct"));
    let scheduled = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await?;
    assert_eq!(scheduled.as_deref(), Some("scheduled"));
    assert!(tokio::time::timeout(Duration::from_millis(60), rx.recv())
        .await
        .is_err());
    handle.stop(Duration::from_secs(1)).await;
    Ok(())
}
