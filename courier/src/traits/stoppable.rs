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

use async_trait::async_trait;

use crate::common::{ActorKey, StopOutcome};

/// Something the runtime can stop without knowing its message type.
#[async_trait]
pub trait Stoppable: Send + Sync {
    /// Identity used in logs and shutdown summaries.
    fn key(&self) -> &ActorKey;

    /// Requests a graceful stop, forcing it after `timeout`.
    async fn stop_within(&self, timeout: Duration) -> StopOutcome;
}
