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

//! Failure budget for supervised actors.
//!
//! Every failure that is resumed or restarted consumes one slot of a rolling
//! window. Once `max_restarts` slots are in use, the next failure inside the
//! window escalates to a stop. Restarts may additionally wait an exponential
//! backoff before the actor is rebuilt.
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! let policy = SupervisorPolicy::new(RestartLimiterConfig {
//!     max_restarts: 5,
//!     window_ms: 10_000,
//!     ..RestartLimiterConfig::default()
//! });
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Failure budget and restart backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartLimiterConfig {
    /// When disabled, failures never escalate.
    pub enabled: bool,

    /// Failures tolerated inside one window.
    pub max_restarts: u32,

    /// Length of the rolling window in milliseconds.
    pub window_ms: u64,

    /// Backoff before the first restart.
    pub initial_backoff_ms: u64,

    /// Upper bound for the backoff.
    pub max_backoff_ms: u64,

    /// Growth factor applied per consecutive restart.
    pub backoff_multiplier: f64,
}

impl Default for RestartLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_restarts: 3,
            window_ms: 3_000,
            initial_backoff_ms: 0,
            max_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RestartLimiterConfig {
    /// A budget that never escalates.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            max_restarts: 0,
            window_ms: 0,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 0.0,
        }
    }

    /// The rolling window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Tracks failures inside a rolling window and computes restart backoff.
#[derive(Debug)]
pub struct RestartLimiter {
    config: RestartLimiterConfig,
    failures: Vec<Instant>,
    consecutive_restarts: usize,
}

impl RestartLimiter {
    /// Creates a limiter with an empty window.
    #[must_use]
    pub const fn new(config: RestartLimiterConfig) -> Self {
        Self {
            config,
            failures: Vec::new(),
            consecutive_restarts: 0,
        }
    }

    /// Checks whether another failure fits in the current window.
    ///
    /// # Errors
    ///
    /// Returns [`RestartLimitExceeded`] when the window is already full.
    pub fn can_restart(&mut self) -> Result<(), RestartLimitExceeded> {
        if !self.config.enabled {
            return Ok(());
        }
        self.prune_expired();
        if self.failures.len() >= self.config.max_restarts as usize {
            Err(RestartLimitExceeded {
                attempts: self.failures.len(),
                max_restarts: self.config.max_restarts,
                window_ms: self.config.window_ms,
            })
        } else {
            Ok(())
        }
    }

    /// Records a tolerated failure and returns the backoff to wait before a restart.
    ///
    /// A disabled limiter keeps no window.
    pub fn record_restart(&mut self) -> Duration {
        if self.config.enabled {
            self.failures.push(Instant::now());
        }
        let backoff = self.peek_backoff();
        self.consecutive_restarts += 1;
        backoff
    }

    /// Resets the backoff sequence without touching the window.
    pub fn reset_consecutive(&mut self) {
        self.consecutive_restarts = 0;
    }

    /// Failures currently inside the window.
    #[must_use]
    pub fn restarts_in_window(&self) -> usize {
        self.failures.len()
    }

    /// Backoff the next restart would wait.
    #[must_use]
    pub fn peek_backoff(&self) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let backoff_ms = self.config.initial_backoff_ms as f64
            * self
                .config
                .backoff_multiplier
                .powi(i32::try_from(self.consecutive_restarts).unwrap_or(i32::MAX));
        #[allow(
            clippy::cast_sign_loss,
            clippy::cast_possible_truncation,
            clippy::cast_precision_loss
        )]
        let capped_ms = backoff_ms.min(self.config.max_backoff_ms as f64).max(0.0) as u64;
        Duration::from_millis(capped_ms)
    }

    fn prune_expired(&mut self) {
        let now = Instant::now();
        let window = self.config.window();
        self.failures.retain(|&at| now.duration_since(at) < window);
        if self.failures.is_empty() {
            self.consecutive_restarts = 0;
        }
    }
}

impl Default for RestartLimiter {
    fn default() -> Self {
        Self::new(RestartLimiterConfig::default())
    }
}

/// The failure budget of an actor is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartLimitExceeded {
    /// Failures inside the window.
    pub attempts: usize,
    /// Configured budget.
    pub max_restarts: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl std::fmt::Display for RestartLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "restart limit exceeded: {} failures (max {}) within {} ms",
            self.attempts, self.max_restarts, self.window_ms
        )
    }
}

impl std::error::Error for RestartLimitExceeded {}
