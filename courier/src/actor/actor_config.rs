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

use crate::actor::SupervisorPolicy;
use crate::common::ActorKey;

/// Settings for spawning a single actor.
///
/// When no policy is set, the runtime applies its configured supervision
/// defaults. A *critical* actor takes the whole runtime down when it stops
/// because of a failure.
#[derive(Debug, Clone)]
pub struct ActorConfig {
    key: ActorKey,
    policy: Option<SupervisorPolicy>,
    critical: bool,
}

impl ActorConfig {
    /// Creates a configuration for the given identity.
    #[must_use]
    pub fn new(key: ActorKey) -> Self {
        Self {
            key,
            policy: None,
            critical: false,
        }
    }

    /// Shorthand for `ActorConfig::new(ActorKey::new(kind, name))`.
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ActorKey::new(kind, name))
    }

    /// Uses a specific supervision policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SupervisorPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Marks the actor as critical to the process.
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// The actor identity.
    #[must_use]
    pub const fn key(&self) -> &ActorKey {
        &self.key
    }

    /// The explicit policy, if one was set.
    #[must_use]
    pub const fn policy(&self) -> Option<&SupervisorPolicy> {
        self.policy.as_ref()
    }

    /// Whether a failure stop terminates the runtime.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        self.critical
    }

    pub(crate) fn with_key(&self, key: ActorKey) -> Self {
        Self {
            key,
            policy: self.policy.clone(),
            critical: self.critical,
        }
    }
}
