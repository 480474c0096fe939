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

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::actor::RestartLimiterConfig;

/// Runtime configuration for Courier.
///
/// Loaded from `config.toml` in the `courier` XDG configuration directory.
/// Every section is optional; missing values fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Stop and shutdown timeouts
    pub timeouts: TimeoutConfig,
    /// Default failure budget for supervised actors
    pub supervision: RestartLimiterConfig,
    /// Coordinator health checking
    pub health: HealthCheckConfig,
    /// Handler retry defaults for the dispatch engine
    pub dispatch: DispatchConfig,
    /// Publisher behavior
    pub publisher: PublisherConfig,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time an actor gets to drain its mailbox before it is cancelled
    pub actor_stop_timeout_ms: u64,
    /// Grace period for a cooperative runtime-wide shutdown
    pub system_shutdown_timeout_ms: u64,
    /// Grace period used when a critical actor fails and takes the runtime down
    pub critical_termination_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            actor_stop_timeout_ms: 5_000,
            system_shutdown_timeout_ms: 5_000,
            critical_termination_grace_ms: 1_000,
        }
    }
}

/// Coordinator health-check schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Delay before the first health check
    pub initial_delay_ms: u64,
    /// Interval between health checks
    pub interval_ms: u64,
    /// In-flight work older than this is expired on the next health check
    pub work_timeout_ms: Option<u64>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 30_000,
            interval_ms: 30_000,
            work_timeout_ms: None,
        }
    }
}

/// Handler retry defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Retries after the first failed handler invocation
    pub handler_max_retries: u32,
    /// Delay between handler retries
    pub retry_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_max_retries: 3,
            retry_backoff_ms: 100,
        }
    }
}

/// Publisher behavior switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// What to do when a publish reaches no subscribers
    pub zero_subscriber_policy: ZeroSubscriberPolicy,
}

/// Treatment of a publish that reached zero subscribers on a transport that
/// reports subscriber counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroSubscriberPolicy {
    /// Soft failure, retried within the publish retry budget.
    #[default]
    Retry,
    /// Counted as a successful publish.
    Accept,
    /// Hard failure, not retried.
    Fail,
}

impl CourierConfig {
    /// Time an actor gets to drain before being cancelled.
    #[must_use]
    pub const fn actor_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.actor_stop_timeout_ms)
    }

    /// Grace period for [`ActorRuntime::shutdown_all`](crate::common::ActorRuntime::shutdown_all).
    #[must_use]
    pub const fn system_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.system_shutdown_timeout_ms)
    }

    /// Grace period for the critical-failure shutdown path.
    #[must_use]
    pub const fn critical_termination_grace(&self) -> Duration {
        Duration::from_millis(self.timeouts.critical_termination_grace_ms)
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML parse error when the text is malformed.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `$XDG_CONFIG_HOME/courier/config.toml` (falling back to
    /// `~/.config/courier/config.toml`). A missing file yields the defaults;
    /// an unreadable or malformed file is logged and also yields the defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("courier") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(text) => match Self::from_toml_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: CourierConfig = CourierConfig::load();
}
