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

use vktty::vktty::pool::slot::Status;
use vktty::vktty::pool::{Pool, PoolError};

use crate::support::{test_config, wait_until, StubLister, StubRunner};

#[tokio::test]
async fn backpressure_escalates_from_creating_to_parallel_bound() {
    // PoolSize=2, PoolCapacity=0, ParallelCreation=1: the first caller
    // triggers a creation, the second hits the concurrency bound.
    let pool = Pool::new(test_config(2, 0, 1), StubRunner::hanging());

    assert_eq!(pool.get_or_create(), Err(PoolError::Creating));
    assert_eq!(pool.get_or_create(), Err(PoolError::MaxParallelCreation));
    assert_eq!(pool.count(Status::Creating), 1);
}

#[tokio::test]
async fn capacity_exhaustion_reports_max_capacity() {
    // PoolSize=1, ParallelCreation=5: fill the single slot, lease it, and the
    // next caller is out of luck.
    let pool = Pool::new(test_config(1, 0, 5), StubRunner::keyed());

    assert_eq!(pool.get_or_create(), Err(PoolError::Creating));
    wait_until("slot 0 to become free", || pool.count(Status::Free) == 1).await;

    let view = pool.get_or_create().expect("the warm slot");
    assert_eq!(view.id, 0);
    assert_eq!(view.key.as_deref(), Some("k0"));

    assert_eq!(pool.get_or_create(), Err(PoolError::MaxCapacity));
}

#[tokio::test]
async fn creating_count_never_exceeds_the_parallel_bound() {
    let pool = Pool::new(test_config(5, 0, 2), StubRunner::hanging());

    assert_eq!(pool.get_or_create(), Err(PoolError::Creating));
    assert_eq!(pool.get_or_create(), Err(PoolError::Creating));
    assert_eq!(pool.get_or_create(), Err(PoolError::MaxParallelCreation));
    assert_eq!(pool.get_or_create(), Err(PoolError::MaxParallelCreation));
    assert_eq!(pool.count(Status::Creating), 2);
}

#[tokio::test]
async fn zero_size_pool_is_always_at_capacity() {
    let pool = Pool::new(test_config(0, 0, 3), StubRunner::keyed());
    assert_eq!(pool.get_or_create(), Err(PoolError::MaxCapacity));
}

#[tokio::test]
async fn leases_are_handed_out_lowest_id_first() {
    let pool = Pool::new(test_config(3, 3, 3), StubRunner::keyed());
    pool.bootstrap(StubLister::empty()).await;
    wait_until("all three slots to warm up", || {
        pool.count(Status::Free) == 3
    })
    .await;

    let first = pool.get_or_create().expect("first lease");
    let second = pool.get_or_create().expect("second lease");
    assert_eq!(first.id, 0);
    assert_eq!(second.id, 1);
    assert_eq!(pool.count(Status::Free), 1);
    assert_eq!(pool.count(Status::Locked), 2);
}

#[tokio::test]
async fn every_slot_carries_its_own_index_and_name() {
    let pool = Pool::new(test_config(4, 4, 4), StubRunner::keyed());
    pool.bootstrap(StubLister::empty()).await;
    wait_until("the pool to warm up", || pool.count(Status::Free) == 4).await;

    let _ = pool.get_or_create().expect("lease");
    for view in pool.ls() {
        assert_eq!(view.name, format!("c{}", view.id));
    }
}
