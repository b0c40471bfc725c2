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

use std::sync::OnceLock;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::vktty::util::DynError;

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static SCRIPT_INVOCATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static SCRIPT_DURATION: OnceLock<HistogramVec> = OnceLock::new();
static POOL_SLOTS: OnceLock<IntGaugeVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        Registry::new_custom(Some("vktty".to_string()), None)
            .expect("failed to initialise vktty metrics registry")
    })
}

fn register_collector<C>(collector: C) -> C
where
    C: Clone + Collector + Send + Sync + 'static,
{
    registry()
        .register(Box::new(collector.clone()))
        .expect("failed to register vktty metric collector");
    collector
}

fn script_invocations_total() -> &'static IntCounterVec {
    SCRIPT_INVOCATIONS_TOTAL.get_or_init(|| {
        let opts = Opts::new(
            "invocations_total",
            "Lifecycle script invocations grouped by action and result",
        )
        .subsystem("script");
        let counter = IntCounterVec::new(opts, &["action", "result"])
            .expect("failed to build script invocation counter");
        register_collector(counter)
    })
}

fn script_duration() -> &'static HistogramVec {
    SCRIPT_DURATION.get_or_init(|| {
        let opts = HistogramOpts::new(
            "duration_seconds",
            "Wall-clock latency of lifecycle script invocations",
        )
        .subsystem("script")
        .buckets(vec![1.0, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 120.0]);
        let histogram = HistogramVec::new(opts, &["action"])
            .expect("failed to build script duration histogram");
        register_collector(histogram)
    })
}

fn pool_slots() -> &'static IntGaugeVec {
    POOL_SLOTS.get_or_init(|| {
        let opts = Opts::new("slots", "Number of pool slots grouped by status").subsystem("pool");
        let gauge = IntGaugeVec::new(opts, &["status"]).expect("failed to build pool slot gauge");
        register_collector(gauge)
    })
}

pub fn record_script_invocation(action: &str, result: &str) {
    script_invocations_total()
        .with_label_values(&[action, result])
        .inc();
}

pub fn observe_script_duration(action: &str, elapsed: Duration) {
    script_duration()
        .with_label_values(&[action])
        .observe(elapsed.as_secs_f64());
}

/// Publishes the per-status slot census taken under the pool lock.
pub fn set_pool_slots(counts: &[(&str, i64)]) {
    let gauge = pool_slots();
    for (status, count) in counts {
        gauge.with_label_values(&[status]).set(*count);
    }
}

/// Renders the registry in the Prometheus text exposition format.
pub fn gather() -> Result<Vec<u8>, DynError> {
    let metric_families = registry().gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}
