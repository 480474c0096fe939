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

use async_trait::async_trait;

use crate::message::ConsumeMessage;

/// Code that processes messages from bound topics.
///
/// Non-bulk bindings always receive single-element batches.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Processes a batch from one topic, in arrival order.
    async fn handle(&self, batch: Vec<ConsumeMessage>) -> anyhow::Result<()>;
}
