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

use std::time::{Duration, Instant};

use crate::coordination::{WorkCompleted, WorkerId};
use crate::message::Recipient;

/// Bookkeeping for one in-flight work item.
pub(crate) struct WorkContext<O> {
    pub(crate) respond_to: Option<Recipient<WorkCompleted<O>>>,
    pub(crate) created_at: Instant,
    pub(crate) worker: WorkerId,
}

impl<O> WorkContext<O> {
    pub(crate) fn new(worker: WorkerId, respond_to: Option<Recipient<WorkCompleted<O>>>) -> Self {
        Self {
            respond_to,
            created_at: Instant::now(),
            worker,
        }
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn is_expired(&self, timeout: Duration) -> bool {
        self.age() >= timeout
    }
}
