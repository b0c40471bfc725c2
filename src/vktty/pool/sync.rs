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

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::vktty::logger::{log, Level};
use crate::vktty::pool::executor::Action;
use crate::vktty::pool::lister::{ClusterLister, ListedCluster};
use crate::vktty::pool::slot::{parse_slot_id, Slot, Status};
use crate::vktty::pool::Pool;

const COMPONENT: &str = "sync";

/// Delay before a deferred re-sync triggered by a transient kube status.
pub const RESYNC_DELAY: Duration = Duration::from_secs(30);

/// How many deferred re-syncs one startup may schedule.
pub const RESYNC_RETRY_BUDGET: u32 = 1;

/// Kube phases that mean "not settled yet, look again later".
const TRANSIENT_STATUSES: [&str; 3] = ["Pending", "Init:0/1", "PodInitializing"];

impl Pool {
    /// Startup sequence: adopt whatever already exists, warm the pool, then
    /// flip the readiness flag. A transient roster entry additionally
    /// schedules a bounded re-sync.
    pub async fn bootstrap(self: &Arc<Self>, lister: Arc<dyn ClusterLister>) {
        if self.sync(lister.as_ref()).await {
            self.schedule_resync(lister, RESYNC_RETRY_BUDGET);
        }
        self.precreate();
        self.ready.store(true, Ordering::SeqCst);
        log(Level::Info, COMPONENT, "Pool ready", &[]);
    }

    /// One adoption pass. Folds the external roster into the slot array and
    /// fetches keys for adopted `Free` slots. Returns true when a transient
    /// kube status was observed. A list or name-parse failure ends the pass;
    /// the pool then simply starts emptier than reality and admission fills
    /// the gap.
    pub async fn sync(self: &Arc<Self>, lister: &dyn ClusterLister) -> bool {
        log(Level::Info, COMPONENT, "Start sync", &[]);

        let roster = match lister.list().await {
            Ok(roster) => roster,
            Err(err) => {
                let err_text = err.to_string();
                log(
                    Level::Error,
                    COMPONENT,
                    "Fail to list",
                    &[("error", err_text.as_str())],
                );
                return false;
            }
        };

        let now = Utc::now();
        let mut transient = false;
        let mut fetch_keys = Vec::new();

        {
            let mut slots = self.write();
            for entry in &roster {
                let Some(id) = parse_slot_id(&entry.name) else {
                    log(
                        Level::Error,
                        COMPONENT,
                        "Fail to parse name",
                        &[("name", entry.name.as_str())],
                    );
                    return transient;
                };
                if id >= self.config.pool_size {
                    log(
                        Level::Warn,
                        COMPONENT,
                        "Roster id outside the pool",
                        &[("name", entry.name.as_str())],
                    );
                    continue;
                }
                // Never clobber a slot with an in-flight worker or a live
                // lease; re-syncs only revisit settled entries.
                if let Some(existing) = &slots[id] {
                    if matches!(
                        existing.status,
                        Status::Creating | Status::Locked | Status::Deleting
                    ) {
                        log(
                            Level::Warn,
                            COMPONENT,
                            "Skip adoption of busy slot",
                            &[
                                ("name", entry.name.as_str()),
                                ("status", existing.status.as_str()),
                            ],
                        );
                        continue;
                    }
                }

                let adopted = classify(entry, self.config.lifetime, now, &mut transient);
                let id_text = id.to_string();
                log(
                    Level::Info,
                    COMPONENT,
                    "Sync update",
                    &[
                        ("id", id_text.as_str()),
                        ("status", adopted.as_str()),
                        ("prev_status", entry.status.as_str()),
                    ],
                );
                if adopted == Status::Free {
                    fetch_keys.push(id);
                }
                slots[id] = Some(Slot::new(id, adopted));
            }
            Self::publish_gauges(&slots);
        }

        fetch_keys.sort_unstable();
        for id in fetch_keys {
            self.fetch_key(id).await;
        }

        transient
    }

    /// Recovers the credential of an adopted cluster. Runs before `ready`,
    /// so the sequential await cannot race admission.
    async fn fetch_key(self: &Arc<Self>, id: usize) {
        let id_text = id.to_string();
        match self.runner.run(Action::Get, id).await {
            Ok(result) if !result.key.is_empty() => {
                self.apply(id, move |entry| {
                    if let Some(slot) = entry {
                        slot.key = result.key;
                    }
                });
            }
            Ok(_) => {
                log(
                    Level::Error,
                    COMPONENT,
                    "Adopted key is empty",
                    &[("id", id_text.as_str())],
                );
                self.apply(id, |entry| {
                    if let Some(slot) = entry {
                        Self::set_status(slot, Status::Error);
                    }
                });
            }
            Err(err) => {
                let err_text = err.to_string();
                log(
                    Level::Error,
                    COMPONENT,
                    "Fail to fetch adopted key",
                    &[("id", id_text.as_str()), ("error", err_text.as_str())],
                );
                self.apply(id, |entry| {
                    if let Some(slot) = entry {
                        Self::set_status(slot, Status::Error);
                    }
                });
            }
        }
    }

    fn schedule_resync(self: &Arc<Self>, lister: Arc<dyn ClusterLister>, budget: u32) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut remaining = budget;
            while remaining > 0 {
                remaining -= 1;
                time::sleep(RESYNC_DELAY).await;
                let remaining_text = remaining.to_string();
                log(
                    Level::Info,
                    COMPONENT,
                    "Deferred re-sync",
                    &[("remaining", remaining_text.as_str())],
                );
                if !pool.sync(lister.as_ref()).await {
                    break;
                }
            }
        });
    }

    /// Warms the pool: installs `Creating` records on nil slots, lowest id
    /// first, until `PoolCapacity` warm-or-warming entries exist. Installs
    /// are capped so the concurrent-creation bound holds here too.
    pub fn precreate(self: &Arc<Self>) {
        let mut installed = Vec::new();
        {
            let mut slots = self.write();
            let free = slots
                .iter()
                .flatten()
                .filter(|slot| slot.status == Status::Free)
                .count();
            let creating = slots
                .iter()
                .flatten()
                .filter(|slot| slot.status == Status::Creating)
                .count();

            let goal = self.config.pool_capacity.saturating_sub(free + creating);
            let headroom = self
                .config
                .pool_parallel_creation
                .saturating_sub(creating);
            let mut remaining = goal.min(headroom);

            for id in 0..slots.len() {
                if remaining == 0 {
                    break;
                }
                if slots[id].is_none() {
                    slots[id] = Some(Slot::new(id, Status::Creating));
                    installed.push(id);
                    remaining -= 1;
                }
            }
            if !installed.is_empty() {
                Self::publish_gauges(&slots);
            }
        }

        let installed_text = installed.len().to_string();
        log(
            Level::Info,
            COMPONENT,
            "Precreate",
            &[("installed", installed_text.as_str())],
        );
        for id in installed {
            self.spawn_create(id);
        }
    }
}

/// Rewrites an observed kube phase into the closed status set.
fn classify(
    entry: &ListedCluster,
    lifetime: Duration,
    now: chrono::DateTime<Utc>,
    transient: &mut bool,
) -> Status {
    if entry.status == "Running" {
        let past_lifetime = match entry.created {
            Some(created) => now
                .signed_duration_since(created)
                .to_std()
                .map(|age| age > lifetime)
                .unwrap_or(false),
            None => false,
        };
        if past_lifetime {
            return Status::Eol;
        }
        return Status::Free;
    }
    if TRANSIENT_STATUSES.contains(&entry.status.as_str()) {
        *transient = true;
        return Status::Error;
    }
    Status::Error
}
