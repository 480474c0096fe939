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
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Builds a fresh actor value. Used for pooled instances and for restarts.
pub type ActorFactory<A> = Arc<dyn Fn() -> A + Send + Sync>;

/// Identity of an actor: the kind of work it does and the instance name.
///
/// Registry keys are unique per `(kind, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorKey {
    kind: String,
    name: String,
}

impl ActorKey {
    /// Creates a key from a kind and an instance name.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// The actor kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the `index`th member of a pool registered under this key.
    #[must_use]
    pub fn member(&self, index: usize) -> Self {
        Self {
            kind: self.kind.clone(),
            name: format!("{}-{index}", self.name),
        }
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Lifecycle of a running actor, as observed through its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActorState {
    /// The task is spawned and the `started` hook has not finished yet.
    Starting = 0,
    /// Processing messages.
    Running = 1,
    /// Draining the mailbox after a stop request.
    Stopping = 2,
    /// The task has exited.
    Stopped = 3,
}

impl From<u8> for ActorState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Shared lifecycle cell written by the run loop and read by handles.
#[derive(Debug, Clone)]
pub(crate) struct LifecycleCell(Arc<AtomicU8>);

impl Default for LifecycleCell {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(ActorState::Starting as u8)))
    }
}

impl LifecycleCell {
    pub(crate) fn get(&self) -> ActorState {
        ActorState::from(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ActorState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The actor drained its mailbox and exited within the timeout.
    Graceful,
    /// The timeout elapsed and the actor was cancelled.
    Forced,
    /// The actor had already exited.
    AlreadyStopped,
}

/// Aggregated result of stopping a group of actors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Actors that stopped within the grace period.
    pub graceful: usize,
    /// Actors that were already stopped.
    pub already_stopped: usize,
    /// Actors that had to be cancelled.
    pub forced: Vec<ActorKey>,
}

impl ShutdownSummary {
    pub(crate) fn record(&mut self, key: ActorKey, outcome: StopOutcome) {
        match outcome {
            StopOutcome::Graceful => self.graceful += 1,
            StopOutcome::AlreadyStopped => self.already_stopped += 1,
            StopOutcome::Forced => self.forced.push(key),
        }
    }

    /// `true` when nothing had to be force-terminated.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.forced.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_member_keys_keep_kind() {
        let key = ActorKey::new("publisher", "orders");
        let member = key.member(2);
        assert_eq!(member.kind(), "publisher");
        assert_eq!(member.name(), "orders-2");
        assert_eq!(member.to_string(), "publisher/orders-2");
    }

    #[test]
    fn lifecycle_cell_round_trips_states() {
        let cell = LifecycleCell::default();
        assert_eq!(cell.get(), ActorState::Starting);
        cell.set(ActorState::Stopping);
        assert_eq!(cell.clone().get(), ActorState::Stopping);
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = ShutdownSummary::default();
        summary.record(ActorKey::new("a", "1"), StopOutcome::Graceful);
        summary.record(ActorKey::new("a", "2"), StopOutcome::AlreadyStopped);
        assert!(summary.is_clean());
        summary.record(ActorKey::new("a", "3"), StopOutcome::Forced);
        assert!(!summary.is_clean());
        assert_eq!(summary.graceful, 1);
        assert_eq!(summary.forced, vec![ActorKey::new("a", "3")]);
    }
}
