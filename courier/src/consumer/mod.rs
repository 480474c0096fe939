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

//! Handler discovery and inbound dispatch.
//!
//! *   [`HandlerBinding`] / [`HandlerSet`]: Explicit handler registrations with
//!     their topic metadata.
//! *   [`HandlerRegistry`]: Resolves bindings against
//!     [`MessagingOptions`](crate::common::MessagingOptions).
//! *   [`DispatchEngine`]: Subscribes once per topic and batches messages into handlers.

pub use dispatch::DispatchEngine;
pub use handler_binding::{handler_fn, json_handler, CommitStrategy, HandlerBinding, HandlerSet};
pub use handler_registry::{ConsumerMetadata, HandlerRegistry, ProcessingConfig};

mod dispatch;
mod handler_binding;
mod handler_registry;
mod topic_dispatcher;
