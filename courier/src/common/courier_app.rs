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

use tracing::trace;

use crate::common::config::{CourierConfig, CONFIG};
use crate::common::ActorRuntime;

/// Entry point for starting a Courier runtime.
///
/// ```rust,ignore
/// use courier::prelude::*;
///
/// #[tokio::main]
/// async fn main() {
///     let runtime = CourierApp::launch_async().await;
///     // spawn and register actors...
///     runtime.shutdown_all().await;
/// }
/// ```
#[derive(Default, Debug, Clone)]
pub struct CourierApp;

impl CourierApp {
    /// Starts a runtime using the configuration loaded from the XDG config directory.
    pub async fn launch_async() -> ActorRuntime {
        trace!("Starting Courier runtime");
        Self::launch_with_config(CONFIG.clone())
    }

    /// Starts a runtime with an explicit configuration.
    #[must_use]
    pub fn launch_with_config(config: CourierConfig) -> ActorRuntime {
        trace!("Configuration: {:?}", config);
        ActorRuntime::new(config)
    }
}
