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

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::common::{ActorHandle, ActorKey, ActorRuntime};

/// Per-actor services available inside [`Actor`](crate::traits::Actor) hooks.
///
/// Timers scheduled through the context belong to the actor: they stop firing
/// once the actor's run loop exits.
pub struct ActorContext<M: Send + 'static> {
    handle: ActorHandle<M>,
    runtime: ActorRuntime,
    timers: CancellationToken,
    stop_requested: bool,
}

impl<M: Send + 'static> ActorContext<M> {
    pub(crate) fn new(handle: ActorHandle<M>, runtime: ActorRuntime) -> Self {
        let timers = handle.cancellation_token.child_token();
        Self {
            handle,
            runtime,
            timers,
            stop_requested: false,
        }
    }

    /// This actor's identity.
    #[must_use]
    pub fn key(&self) -> &ActorKey {
        self.handle.key()
    }

    /// A handle to this actor.
    #[must_use]
    pub const fn handle(&self) -> &ActorHandle<M> {
        &self.handle
    }

    /// The runtime the actor runs in.
    #[must_use]
    pub const fn runtime(&self) -> &ActorRuntime {
        &self.runtime
    }

    /// Stops the actor gracefully after the current message. Messages already
    /// queued are still handled.
    pub fn stop_self(&mut self) {
        trace!(actor = %self.handle.key(), "stop requested from inside the actor");
        self.stop_requested = true;
    }

    /// Delivers `message` to this actor after `delay`.
    pub fn schedule_once(&self, delay: Duration, message: M) {
        let handle = self.handle.clone();
        let timers = self.timers.clone();
        self.handle.tracker.spawn(async move {
            tokio::select! {
                () = timers.cancelled() => {}
                () = tokio::time::sleep(delay) => handle.send(message),
            }
        });
    }

    /// Delivers a message built by `make` after `initial_delay`, then every `period`.
    pub fn schedule_repeating<F>(&self, initial_delay: Duration, period: Duration, make: F)
    where
        F: Fn() -> M + Send + 'static,
    {
        let handle = self.handle.clone();
        let timers = self.timers.clone();
        let period = period.max(Duration::from_millis(1));
        self.handle.tracker.spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut ticks = tokio::time::interval_at(start, period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = timers.cancelled() => break,
                    _ = ticks.tick() => {
                        if handle.is_closed() {
                            break;
                        }
                        handle.send(make());
                    }
                }
            }
        });
    }

    pub(crate) fn take_stop_request(&mut self) -> bool {
        std::mem::take(&mut self.stop_requested)
    }

    pub(crate) fn cancel_timers(&self) {
        self.timers.cancel();
    }
}
