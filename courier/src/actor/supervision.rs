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

//! Failure classification for supervised actors.
//!
//! A [`SupervisorPolicy`] maps each [`ActorError`] to a [`Directive`]. The
//! per-actor [`Supervisor`] combines that directive with the failure budget
//! tracked by a [`RestartLimiter`] and produces the final
//! [`SupervisionDecision`] the run loop acts on.
//!
//! Default classification:
//!
//! | Failure                        | Directive |
//! |--------------------------------|-----------|
//! | `Transient`, `Panic`           | `Resume`  |
//! | `Initialization`, `Fatal`      | `Stop`    |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actor::{RestartLimitExceeded, RestartLimiter, RestartLimiterConfig};
use crate::common::{ActorError, FailureKind};

/// What a policy wants done about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Drop the failing message and keep the current actor state.
    Resume,
    /// Rebuild the actor state from its factory and keep the mailbox.
    Restart,
    /// Stop the actor.
    Stop,
}

type Classifier = Arc<dyn Fn(&ActorError) -> Directive + Send + Sync>;

/// Classification rule plus failure budget for one actor.
#[derive(Clone)]
pub struct SupervisorPolicy {
    limits: RestartLimiterConfig,
    classifier: Classifier,
}

impl fmt::Debug for SupervisorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorPolicy")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self::new(RestartLimiterConfig::default())
    }
}

impl SupervisorPolicy {
    /// A policy with the default classification and the given budget.
    #[must_use]
    pub fn new(limits: RestartLimiterConfig) -> Self {
        Self {
            limits,
            classifier: Arc::new(default_classification),
        }
    }

    /// Replaces the classification rule.
    #[must_use]
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&ActorError) -> Directive + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Classifies a failure.
    #[must_use]
    pub fn classify(&self, error: &ActorError) -> Directive {
        (self.classifier)(error)
    }

    /// Failures tolerated inside one window.
    #[must_use]
    pub const fn max_restarts(&self) -> u32 {
        self.limits.max_restarts
    }

    /// The rolling window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.limits.window()
    }

    /// The budget settings.
    #[must_use]
    pub const fn limits(&self) -> &RestartLimiterConfig {
        &self.limits
    }
}

fn default_classification(error: &ActorError) -> Directive {
    match error.kind() {
        FailureKind::Transient | FailureKind::Panic => Directive::Resume,
        FailureKind::Initialization | FailureKind::Fatal => Directive::Stop,
    }
}

/// The action the run loop takes after a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionDecision {
    /// Keep going with the next message.
    Resume,
    /// Wait for the backoff, then rebuild the actor.
    Restart(Duration),
    /// The policy asked for a stop.
    Stop,
    /// The failure budget is exhausted.
    Escalate(RestartLimitExceeded),
}

/// Per-actor supervision state.
#[derive(Debug)]
pub(crate) struct Supervisor {
    policy: SupervisorPolicy,
    limiter: RestartLimiter,
}

impl Supervisor {
    pub(crate) fn new(policy: SupervisorPolicy) -> Self {
        let limiter = RestartLimiter::new(policy.limits.clone());
        Self { policy, limiter }
    }

    pub(crate) fn decide(&mut self, error: &ActorError) -> SupervisionDecision {
        let directive = self.policy.classify(error);
        if directive == Directive::Stop {
            return SupervisionDecision::Stop;
        }
        if let Err(exceeded) = self.limiter.can_restart() {
            return SupervisionDecision::Escalate(exceeded);
        }
        let backoff = self.limiter.record_restart();
        match directive {
            Directive::Restart => SupervisionDecision::Restart(backoff),
            Directive::Resume | Directive::Stop => SupervisionDecision::Resume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> ActorError {
        ActorError::transient(anyhow::anyhow!("flaky"))
    }

    #[test]
    fn default_policy_resumes_transient_and_panics() {
        let policy = SupervisorPolicy::default();
        assert_eq!(policy.classify(&transient()), Directive::Resume);
        assert_eq!(
            policy.classify(&ActorError::panic("boom".into())),
            Directive::Resume
        );
        assert_eq!(
            policy.classify(&ActorError::initialization(anyhow::anyhow!("no db"))),
            Directive::Stop
        );
        assert_eq!(
            policy.classify(&ActorError::fatal(anyhow::anyhow!("corrupt"))),
            Directive::Stop
        );
    }

    #[test]
    fn fourth_failure_within_window_escalates() {
        let mut supervisor = Supervisor::new(SupervisorPolicy::default());
        for _ in 0..3 {
            assert_eq!(supervisor.decide(&transient()), SupervisionDecision::Resume);
        }
        assert!(matches!(
            supervisor.decide(&transient()),
            SupervisionDecision::Escalate(RestartLimitExceeded { attempts: 3, .. })
        ));
    }

    #[test]
    fn stop_directive_skips_the_budget() {
        let mut supervisor = Supervisor::new(SupervisorPolicy::default());
        assert_eq!(
            supervisor.decide(&ActorError::fatal(anyhow::anyhow!("corrupt"))),
            SupervisionDecision::Stop
        );
    }

    #[test]
    fn custom_classifier_can_request_restart() {
        let policy = SupervisorPolicy::new(RestartLimiterConfig {
            initial_backoff_ms: 10,
            ..RestartLimiterConfig::default()
        })
        .with_classifier(|_| Directive::Restart);
        let mut supervisor = Supervisor::new(policy);
        assert_eq!(
            supervisor.decide(&transient()),
            SupervisionDecision::Restart(Duration::from_millis(10))
        );
        assert_eq!(
            supervisor.decide(&transient()),
            SupervisionDecision::Restart(Duration::from_millis(20))
        );
    }
}
