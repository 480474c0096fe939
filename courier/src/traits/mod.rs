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

//! Core traits.
//!
//! *   [`Actor`]: Behavior run by a supervised mailbox.
//! *   [`Transport`]: The broker interface consumed by dispatch and publishing.
//! *   [`MessageHandler`]: Code bound to topics through a handler binding.
//! *   [`Stoppable`]: Type-erased stop capability used by the registry.

pub use actor::Actor;
pub use message_handler::MessageHandler;
pub use stoppable::Stoppable;
pub use transport::{MessageCallback, Transport};

mod actor;
mod message_handler;
mod stoppable;
mod transport;
