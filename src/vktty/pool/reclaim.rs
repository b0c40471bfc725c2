/*
 * Copyright (C) 2025 The Vktty Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::vktty::pool::Pool;

/// Cadence of the reclaim sweep. Single-replica deployment; no jitter.
pub const RECLAIM_TICK: Duration = Duration::from_secs(10);

/// Spawns the reclaim loop. It runs for the life of the process; each tick
/// delegates to [`Pool::reclaim_pass`] with the current wall clock.
pub fn spawn(pool: Arc<Pool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(RECLAIM_TICK);
        loop {
            ticker.tick().await;
            pool.reclaim_pass(Utc::now());
        }
    })
}
