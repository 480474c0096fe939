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

use crate::common::ActorKey;

/// Errors returned synchronously by Courier APIs.
///
/// Configuration and registration problems surface here. Failures that happen
/// while messages are being dispatched or published are logged by the owning
/// actor and never cross an actor boundary.
#[derive(Debug)]
pub enum CourierError {
    /// One or more configuration problems. Every violation found is listed.
    Configuration(Vec<String>),
    /// An actor or handler with this key is already registered.
    RegistrationConflict {
        /// Registry kind (`"handler"` for handler bindings).
        kind: String,
        /// Instance name or handler id.
        name: String,
    },
    /// Nothing is registered under this key.
    NotFound {
        /// Registry kind.
        kind: String,
        /// Instance name.
        name: String,
    },
    /// The registered actor accepts a different message type.
    TypeMismatch {
        /// The key that was resolved.
        key: ActorKey,
        /// Message type the caller asked for.
        expected: &'static str,
        /// Message type of the registered actor.
        actual: &'static str,
    },
    /// A registration request violates its own invariants.
    InvalidRegistration(String),
    /// The transport rejected an operation.
    Transport(TransportError),
    /// A message handler failed.
    HandlerExecution {
        /// The failing handler.
        handler_id: String,
        /// What went wrong.
        source: anyhow::Error,
    },
    /// An actor could not complete its `started` hook.
    ActorInitialization {
        /// The failing actor.
        key: ActorKey,
        /// What went wrong.
        source: anyhow::Error,
    },
    /// The actor's mailbox no longer accepts messages.
    MailboxClosed(ActorKey),
}

impl CourierError {
    /// Builds a registration conflict for a key.
    pub fn conflict(key: &ActorKey) -> Self {
        Self::RegistrationConflict {
            kind: key.kind().to_string(),
            name: key.name().to_string(),
        }
    }

    /// Builds a not-found error for a key.
    pub fn not_found(key: &ActorKey) -> Self {
        Self::NotFound {
            kind: key.kind().to_string(),
            name: key.name().to_string(),
        }
    }

    /// The individual violations of a configuration error, empty otherwise.
    #[must_use]
    pub fn violations(&self) -> &[String] {
        match self {
            Self::Configuration(violations) => violations,
            _ => &[],
        }
    }
}

impl fmt::Display for CourierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(violations) => {
                write!(f, "invalid configuration: {}", violations.join("; "))
            }
            Self::RegistrationConflict { kind, name } => {
                write!(f, "{kind}/{name} is already registered")
            }
            Self::NotFound { kind, name } => write!(f, "{kind}/{name} is not registered"),
            Self::TypeMismatch {
                key,
                expected,
                actual,
            } => write!(
                f,
                "{key} accepts {actual}, but {expected} was requested"
            ),
            Self::InvalidRegistration(reason) => write!(f, "invalid registration: {reason}"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::HandlerExecution { handler_id, source } => {
                write!(f, "handler '{handler_id}' failed: {source:#}")
            }
            Self::ActorInitialization { key, source } => {
                write!(f, "actor {key} failed to initialize: {source:#}")
            }
            Self::MailboxClosed(key) => write!(f, "mailbox of {key} is closed"),
        }
    }
}

impl std::error::Error for CourierError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::HandlerExecution { source, .. } | Self::ActorInitialization { source, .. } => {
                Some(source.as_ref())
            }
            _ => None,
        }
    }
}

impl From<TransportError> for CourierError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

/// Errors reported by a [`Transport`](crate::traits::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport was closed.
    Closed,
    /// The broker refused the operation.
    Rejected {
        /// Topic the operation targeted.
        topic: String,
        /// Broker-supplied reason.
        reason: String,
    },
    /// The broker could not be reached.
    Unavailable(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport is closed"),
            Self::Rejected { topic, reason } => write!(f, "'{topic}' rejected: {reason}"),
            Self::Unavailable(reason) => write!(f, "broker unavailable: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// How an actor failure should be treated by its supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A recoverable error tied to a single message.
    Transient,
    /// The actor could not set itself up.
    Initialization,
    /// The actor's state can no longer be trusted.
    Fatal,
    /// The handler panicked.
    Panic,
}

/// Error returned from [`Actor`](crate::traits::Actor) hooks and handlers.
#[derive(Debug)]
pub struct ActorError {
    kind: FailureKind,
    source: anyhow::Error,
}

impl ActorError {
    /// Creates an error of the given kind.
    pub fn new(kind: FailureKind, source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    /// A recoverable, per-message failure.
    pub fn transient(source: impl Into<anyhow::Error>) -> Self {
        Self::new(FailureKind::Transient, source)
    }

    /// A failure to initialize.
    pub fn initialization(source: impl Into<anyhow::Error>) -> Self {
        Self::new(FailureKind::Initialization, source)
    }

    /// An unrecoverable failure.
    pub fn fatal(source: impl Into<anyhow::Error>) -> Self {
        Self::new(FailureKind::Fatal, source)
    }

    pub(crate) fn panic(message: String) -> Self {
        Self::new(FailureKind::Panic, anyhow::anyhow!("handler panicked: {message}"))
    }

    /// The failure classification.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    /// The underlying error.
    #[must_use]
    pub fn source_error(&self) -> &anyhow::Error {
        &self.source
    }

    /// Consumes the error, returning the underlying cause.
    #[must_use]
    pub fn into_source(self) -> anyhow::Error {
        self.source
    }
}

impl fmt::Display for ActorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} failure: {:#}", self.kind, self.source)
    }
}

impl std::error::Error for ActorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<anyhow::Error> for ActorError {
    fn from(source: anyhow::Error) -> Self {
        Self::transient(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_lists_every_violation() {
        let err = CourierError::Configuration(vec![
            "connection_string must not be empty".to_string(),
            "max_batch_size must be greater than zero".to_string(),
        ]);
        let display = err.to_string();
        assert!(display.contains("connection_string"));
        assert!(display.contains("max_batch_size"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn anyhow_errors_default_to_transient() {
        let err: ActorError = anyhow::anyhow!("socket reset").into();
        assert_eq!(err.kind(), FailureKind::Transient);
        assert!(err.to_string().contains("socket reset"));
    }

    #[test]
    fn transport_errors_convert() {
        let err: CourierError = TransportError::Closed.into();
        assert!(matches!(err, CourierError::Transport(TransportError::Closed)));
    }
}
