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

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, trace, warn};

use crate::actor::{ActorContext, SupervisionDecision, Supervisor};
use crate::common::{ActorError, ActorFactory, ActorKey, ActorState, CourierError};
use crate::message::{Envelope, SystemSignal};
use crate::traits::Actor;

/// An actor value together with everything its run loop needs.
pub(crate) struct ManagedActor<A: Actor> {
    actor: A,
    ctx: ActorContext<A::Message>,
    inbox: mpsc::UnboundedReceiver<Envelope<A::Message>>,
    supervisor: Supervisor,
    factory: Option<ActorFactory<A>>,
    critical: bool,
}

impl<A: Actor> ManagedActor<A> {
    pub(crate) fn new(
        actor: A,
        ctx: ActorContext<A::Message>,
        inbox: mpsc::UnboundedReceiver<Envelope<A::Message>>,
        supervisor: Supervisor,
        factory: Option<ActorFactory<A>>,
        critical: bool,
    ) -> Self {
        Self {
            actor,
            ctx,
            inbox,
            supervisor,
            factory,
            critical,
        }
    }

    fn key(&self) -> ActorKey {
        self.ctx.key().clone()
    }

    // wake() drives the mailbox until it is closed and drained, the actor is
    // cancelled, or supervision stops it.
    #[instrument(skip(self), fields(actor = %self.ctx.key()))]
    pub(crate) async fn wake(mut self) {
        let cancel = self.ctx.handle().cancellation_token.clone();

        if self.start().await {
            self.ctx.handle().state.set(ActorState::Running);
            self.run(&cancel).await;
        }

        self.ctx.handle().state.set(ActorState::Stopping);
        self.inbox.close();
        self.ctx.cancel_timers();
        if !cancel.is_cancelled() {
            let _ = AssertUnwindSafe(self.actor.stopped(&mut self.ctx))
                .catch_unwind()
                .await;
        }
        self.ctx.handle().state.set(ActorState::Stopped);
        trace!("actor stopped");
    }

    async fn run(&mut self, cancel: &CancellationToken) {
        loop {
            let incoming = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    trace!("cancellation triggered");
                    break;
                }
                incoming = self.inbox.recv() => incoming,
            };
            let Some(envelope) = incoming else {
                trace!("mailbox closed and drained");
                break;
            };
            match envelope {
                Envelope::Signal(SystemSignal::Terminate) => {
                    trace!("terminate received, draining mailbox");
                    self.ctx.handle().state.set(ActorState::Stopping);
                    self.inbox.close();
                }
                Envelope::Message(message) => {
                    if !self.dispatch(message, cancel).await {
                        break;
                    }
                }
            }
            if self.ctx.take_stop_request() {
                self.ctx.handle().state.set(ActorState::Stopping);
                self.inbox.close();
            }
        }
    }

    async fn start(&mut self) -> bool {
        let outcome = AssertUnwindSafe(self.actor.started(&mut self.ctx))
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(())) => return true,
            Ok(Err(err)) => err,
            Err(panic) => ActorError::panic(panic_message(&*panic)),
        };
        error!(error = %failure, "actor failed to initialize");
        if self.critical {
            self.ctx
                .runtime()
                .record_termination_cause(CourierError::ActorInitialization {
                    key: self.key(),
                    source: failure.into_source(),
                });
        }
        self.escalate();
        false
    }

    /// Returns `false` when the loop must exit.
    async fn dispatch(&mut self, message: A::Message, cancel: &CancellationToken) -> bool {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                trace!("cancelled while handling a message");
                return false;
            }
            outcome = AssertUnwindSafe(self.actor.handle(message, &mut self.ctx))
                .catch_unwind() => outcome,
        };
        let failure = match outcome {
            Ok(Ok(())) => return true,
            Ok(Err(err)) => err,
            Err(panic) => ActorError::panic(panic_message(&*panic)),
        };
        self.supervise(failure).await
    }

    async fn supervise(&mut self, failure: ActorError) -> bool {
        match self.supervisor.decide(&failure) {
            SupervisionDecision::Resume => {
                warn!(error = %failure, "message failed, resuming");
                true
            }
            SupervisionDecision::Restart(backoff) => {
                warn!(
                    error = %failure,
                    backoff_ms = backoff.as_millis(),
                    "message failed, restarting"
                );
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                self.restart().await
            }
            SupervisionDecision::Stop => {
                error!(error = %failure, "message failed, stopping");
                self.escalate();
                false
            }
            SupervisionDecision::Escalate(exceeded) => {
                error!(error = %failure, "{exceeded}, stopping");
                self.escalate();
                false
            }
        }
    }

    async fn restart(&mut self) -> bool {
        let Some(factory) = self.factory.clone() else {
            trace!("no factory registered, keeping current state");
            return true;
        };
        let _ = AssertUnwindSafe(self.actor.stopped(&mut self.ctx))
            .catch_unwind()
            .await;
        self.actor = factory();
        self.start().await
    }

    /// A critical actor that stops on failure takes the runtime down with it.
    fn escalate(&self) {
        if !self.critical {
            return;
        }
        let key = self.key();
        let runtime = self.ctx.runtime().clone();
        error!(actor = %key, "critical actor failed, terminating runtime");
        tokio::spawn(async move {
            runtime.terminate().await;
        });
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_rendered() {
        let literal: Box<dyn Any + Send> = Box::new("literal");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*literal), "literal");
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*other), "non-string panic payload");
    }
}
