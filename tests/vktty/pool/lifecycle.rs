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

use std::time::Duration;

use chrono::{TimeDelta, Utc};

use vktty::vktty::pool::executor::Action;
use vktty::vktty::pool::slot::Status;
use vktty::vktty::pool::Pool;

use crate::support::{
    test_config, test_config_with_lifetime, wait_until, StubLister, StubRunner,
};

#[tokio::test]
async fn cold_start_warms_the_pool_to_capacity() {
    // PoolSize=5, PoolCapacity=2, ParallelCreation=3, nothing pre-existing.
    let runner = StubRunner::keyed();
    let pool = Pool::new(test_config(5, 2, 3), runner.clone());

    pool.bootstrap(StubLister::empty()).await;
    assert!(pool.is_ready());

    wait_until("both precreated slots to warm up", || {
        pool.count(Status::Free) == 2
    })
    .await;

    let admin = pool.sudo_ls();
    assert_eq!(admin.len(), 2);
    assert_eq!(admin[0].key.as_deref(), Some("k0"));
    assert_eq!(admin[1].key.as_deref(), Some("k1"));

    // The public listing shows the same two slots with the key elided.
    let public = pool.ls();
    assert_eq!(public.len(), 2);
    assert!(public.iter().all(|view| view.key.is_none()));
    assert_eq!(
        runner
            .calls()
            .iter()
            .filter(|(action, _)| *action == Action::Create)
            .count(),
        2
    );
}

#[tokio::test]
async fn leased_slot_expires_and_is_recycled() {
    let lifetime = Duration::from_secs(600);
    let runner = StubRunner::keyed();
    let pool = Pool::new(test_config_with_lifetime(5, 2, 3, lifetime), runner.clone());
    pool.bootstrap(StubLister::empty()).await;
    wait_until("the pool to warm up", || pool.count(Status::Free) == 2).await;

    let view = pool.get_or_create().expect("lease slot 0");
    assert_eq!(view.id, 0);
    assert_eq!(view.key.as_deref(), Some("k0"));
    assert_eq!(pool.count(Status::Locked), 1);

    // Not expired yet: a tick inside the lifetime leaves the lease alone.
    pool.reclaim_pass(Utc::now());
    assert_eq!(pool.count(Status::Locked), 1);

    // One second past the lifetime the slot is reclaimed down to nil.
    pool.reclaim_pass(Utc::now() + TimeDelta::seconds(601));
    wait_until("slot 0 to be deleted", || {
        pool.ls().iter().all(|view| view.id != 0)
    })
    .await;
    assert!(runner.calls().contains(&(Action::Delete, 0)));

    // A fresh precreate round restores the warm capacity.
    pool.precreate();
    wait_until("slot 0 to be recreated", || pool.count(Status::Free) == 2).await;
}

#[tokio::test]
async fn zero_lifetime_reclaims_on_the_next_tick() {
    let runner = StubRunner::keyed();
    let pool = Pool::new(
        test_config_with_lifetime(2, 1, 2, Duration::ZERO),
        runner.clone(),
    );
    pool.bootstrap(StubLister::empty()).await;
    wait_until("the pool to warm up", || pool.count(Status::Free) == 1).await;

    pool.get_or_create().expect("lease");
    pool.reclaim_pass(Utc::now() + TimeDelta::seconds(1));
    wait_until("the leased slot to vanish", || pool.ls().is_empty()).await;
}

#[tokio::test]
async fn failed_creation_is_quarantined_then_reaped() {
    let runner = StubRunner::with(|action, _| match action {
        Action::Create => crate::support::StubBehavior::Fail,
        _ => crate::support::StubBehavior::Key(String::new()),
    });
    let pool = Pool::new(test_config(2, 1, 2), runner.clone());

    pool.bootstrap(StubLister::empty()).await;
    wait_until("the failed create to quarantine", || {
        pool.count(Status::Error) == 1
    })
    .await;

    // Error slots are reclaimed regardless of any lease timestamp.
    pool.reclaim_pass(Utc::now());
    wait_until("the quarantined slot to vanish", || pool.ls().is_empty()).await;
    assert!(runner.calls().contains(&(Action::Delete, 0)));
}

#[tokio::test]
async fn create_reporting_not_found_resets_the_slot() {
    let runner = StubRunner::with(|action, _| match action {
        Action::Create => crate::support::StubBehavior::NotFound,
        _ => crate::support::StubBehavior::Key(String::new()),
    });
    let pool = Pool::new(test_config(1, 1, 1), runner.clone());

    pool.bootstrap(StubLister::empty()).await;
    wait_until("the slot to reset to nil", || pool.ls().is_empty()).await;

    // Admission can retry cleanly on the next call.
    assert_eq!(
        pool.get_or_create(),
        Err(vktty::vktty::pool::PoolError::Creating)
    );
}

#[tokio::test]
async fn failed_deletion_keeps_the_slot_reclaimable() {
    let runner = StubRunner::with(|action, id| match (action, id) {
        (Action::Delete, 0) => crate::support::StubBehavior::Fail,
        _ => crate::support::StubBehavior::Key(format!("k{id}")),
    });
    let pool = Pool::new(
        test_config_with_lifetime(1, 1, 1, Duration::from_secs(600)),
        runner.clone(),
    );
    pool.bootstrap(StubLister::empty()).await;
    wait_until("the pool to warm up", || pool.count(Status::Free) == 1).await;

    pool.get_or_create().expect("lease");
    pool.reclaim_pass(Utc::now() + TimeDelta::seconds(601));
    wait_until("the failed delete to quarantine", || {
        pool.count(Status::Error) == 1
    })
    .await;

    // Still deletable: the next tick retries the deletion.
    pool.reclaim_pass(Utc::now());
    wait_until("a delete retry to be launched", || {
        runner
            .calls()
            .iter()
            .filter(|(action, _)| *action == Action::Delete)
            .count()
            >= 2
    })
    .await;
}
