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

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::vktty::config::Config;
use crate::vktty::logger::{log, Level};
use crate::vktty::observability::metrics;

pub mod executor;
pub mod lister;
pub mod reclaim;
pub mod slot;
mod sync;

pub use sync::{RESYNC_DELAY, RESYNC_RETRY_BUDGET};

use executor::{Action, ExecError, ScriptRunner};
use slot::{Slot, SlotView, Status, ALL_STATUSES};

const COMPONENT: &str = "pool";

/// Admission outcomes that are not a slot. Each maps to a distinct HTTP
/// status so clients can tell "wait a moment" from "come back later" from
/// "the pool is full".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// A create was enqueued for the caller; the slot is not ready yet.
    Creating,
    /// No free slot and the concurrent-creation bound is already reached.
    MaxParallelCreation,
    /// Every slot is occupied.
    MaxCapacity,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Creating => f.write_str("please come back in a moment"),
            PoolError::MaxParallelCreation => f.write_str("please come back later"),
            PoolError::MaxCapacity => f.write_str("max capacity"),
        }
    }
}

impl Error for PoolError {}

/// Fixed-slot pool of vclusters. The slot array is the only shared mutable
/// state; one reader-writer lock guards it and is never held across a
/// subprocess await.
pub struct Pool {
    config: Config,
    runner: Arc<dyn ScriptRunner>,
    slots: RwLock<Vec<Option<Slot>>>,
    ready: AtomicBool,
}

impl Pool {
    pub fn new(config: Config, runner: Arc<dyn ScriptRunner>) -> Arc<Self> {
        let slots = (0..config.pool_size).map(|_| None).collect();
        Arc::new(Self {
            config,
            runner,
            slots: RwLock::new(slots),
            ready: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True once startup adoption and precreate have completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Option<Slot>>> {
        self.slots.read().expect("slot table poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Option<Slot>>> {
        self.slots.write().expect("slot table poisoned")
    }

    /// Snapshot of the pool with credentials elided.
    pub fn ls(&self) -> Vec<SlotView> {
        self.read().iter().flatten().map(Slot::view).collect()
    }

    /// Admin snapshot. Copying the internal key into the public field is the
    /// one intentional leak; the HTTP layer gates it behind basic auth.
    pub fn sudo_ls(&self) -> Vec<SlotView> {
        self.read()
            .iter()
            .flatten()
            .map(Slot::view_with_key)
            .collect()
    }

    pub fn count(&self, status: Status) -> usize {
        self.read()
            .iter()
            .flatten()
            .filter(|slot| slot.status == status)
            .count()
    }

    /// Admission: lease the lowest-id `Free` slot, or start creating one, or
    /// push back. Runs entirely under the write lock; never blocks on the
    /// lifecycle script.
    pub fn get_or_create(self: &Arc<Self>) -> Result<SlotView, PoolError> {
        let mut slots = self.write();

        let creating = slots
            .iter()
            .flatten()
            .filter(|slot| slot.status == Status::Creating)
            .count();

        if let Some(slot) = slots
            .iter_mut()
            .flatten()
            .find(|slot| slot.status == Status::Free)
        {
            Self::set_status(slot, Status::Locked);
            slot.leased_at = Some(Utc::now());
            let view = slot.view_with_key();
            Self::publish_gauges(&slots);
            return Ok(view);
        }

        if creating >= self.config.pool_parallel_creation {
            return Err(PoolError::MaxParallelCreation);
        }

        if let Some(id) = slots.iter().position(Option::is_none) {
            slots[id] = Some(Slot::new(id, Status::Creating));
            let id_text = id.to_string();
            log(Level::Info, COMPONENT, "New", &[("id", id_text.as_str())]);
            Self::publish_gauges(&slots);
            drop(slots);
            self.spawn_create(id);
            return Err(PoolError::Creating);
        }

        Err(PoolError::MaxCapacity)
    }

    /// One reclaim sweep. Marks every deletable slot `Deleting` under the
    /// lock, then launches the delete workers with the lock released. `now`
    /// is a parameter so tests drive time explicitly.
    pub fn reclaim_pass(self: &Arc<Self>, now: DateTime<Utc>) {
        let mut doomed = Vec::new();
        {
            let mut slots = self.write();
            for entry in slots.iter_mut() {
                let Some(slot) = entry.as_mut() else { continue };
                if slot.is_deletable(self.config.lifetime, now) {
                    Self::set_status(slot, Status::Deleting);
                    slot.leased_at = None;
                    doomed.push(slot.id);
                }
            }
            if !doomed.is_empty() {
                Self::publish_gauges(&slots);
            }
        }
        for id in doomed {
            self.spawn_delete(id);
        }
    }

    fn spawn_create(self: &Arc<Self>, id: usize) {
        let pool = Arc::clone(self);
        tokio::spawn(async move { pool.add(id).await });
    }

    fn spawn_delete(self: &Arc<Self>, id: usize) {
        let pool = Arc::clone(self);
        tokio::spawn(async move { pool.delete(id).await });
    }

    /// Create worker. The slot is re-read under the lock when the script
    /// returns: an intervening reset may have cleared it, in which case the
    /// external effect stands but the pool state is left alone.
    async fn add(self: Arc<Self>, id: usize) {
        match self.runner.run(Action::Create, id).await {
            Ok(result) => self.apply(id, move |entry| {
                if let Some(slot) = entry {
                    slot.key = result.key;
                    Self::set_status(slot, Status::Free);
                }
            }),
            Err(ExecError::NotFound) => {
                // The script says the cluster does not exist post-create:
                // reset the slot so admission can retry cleanly.
                let id_text = id.to_string();
                log(Level::Warn, COMPONENT, "Reset", &[("id", id_text.as_str())]);
                self.apply(id, |entry| *entry = None);
            }
            Err(err) => {
                self.quarantine(id, Action::Create, err);
            }
        }
    }

    /// Delete worker. `NotFound` counts as success: the cluster is gone
    /// either way.
    async fn delete(self: Arc<Self>, id: usize) {
        match self.runner.run(Action::Delete, id).await {
            Ok(_) | Err(ExecError::NotFound) => {
                let id_text = id.to_string();
                log(Level::Info, COMPONENT, "Reclaimed", &[("id", id_text.as_str())]);
                self.apply(id, |entry| *entry = None);
            }
            Err(err) => {
                // Error keeps the slot eligible for the next reclaim attempt.
                self.quarantine(id, Action::Delete, err);
            }
        }
    }

    fn quarantine(&self, id: usize, action: Action, err: ExecError) {
        let id_text = id.to_string();
        let err_text = err.to_string();
        log(
            Level::Error,
            COMPONENT,
            "Script error",
            &[
                ("id", id_text.as_str()),
                ("action", action.as_str()),
                ("error", err_text.as_str()),
            ],
        );
        self.apply(id, |entry| {
            if let Some(slot) = entry {
                Self::set_status(slot, Status::Error);
            }
        });
    }

    /// Applies a slot mutation under the write lock and refreshes the slot
    /// census. Callers pass closures that tolerate `None`.
    fn apply(&self, id: usize, f: impl FnOnce(&mut Option<Slot>)) {
        let mut slots = self.write();
        if let Some(entry) = slots.get_mut(id) {
            f(entry);
        }
        Self::publish_gauges(&slots);
    }

    /// Single point through which every status move flows.
    fn set_status(slot: &mut Slot, to: Status) {
        let from = slot.status;
        slot.status = to;
        let id_text = slot.id.to_string();
        log(
            Level::Info,
            COMPONENT,
            "Transition",
            &[
                ("id", id_text.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ],
        );
    }

    fn publish_gauges(slots: &[Option<Slot>]) {
        let counts: Vec<(&str, i64)> = ALL_STATUSES
            .iter()
            .map(|status| {
                let count = slots
                    .iter()
                    .flatten()
                    .filter(|slot| slot.status == *status)
                    .count();
                (status.as_str(), count as i64)
            })
            .collect();
        metrics::set_pool_slots(&counts);
    }
}
