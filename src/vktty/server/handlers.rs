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

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::vktty::config::Config;
use crate::vktty::observability::metrics;
use crate::vktty::pool::slot::SlotView;
use crate::vktty::pool::{Pool, PoolError};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Serialize)]
pub(super) struct MsgBody {
    msg: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ReadyBody {
    msg: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct VclustersBody {
    vclusters: Vec<SlotView>,
}

#[derive(Debug, Serialize)]
pub(super) struct InfoBody {
    parallel_creation: usize,
    capacity: usize,
    size: usize,
    lifetime: String,
}

pub(super) async fn root() -> Json<MsgBody> {
    Json(MsgBody {
        msg: "🐰".to_string(),
    })
}

pub(super) async fn ls(State(pool): State<Arc<Pool>>) -> Json<VclustersBody> {
    Json(VclustersBody {
        vclusters: pool.ls(),
    })
}

pub(super) async fn sudo_ls(State(pool): State<Arc<Pool>>) -> Json<VclustersBody> {
    Json(VclustersBody {
        vclusters: pool.sudo_ls(),
    })
}

/// `/get`: lease a slot or translate the admission pushback into its status
/// code. Never blocks on the lifecycle script.
pub(super) async fn lease(State(pool): State<Arc<Pool>>) -> Response {
    match pool.get_or_create() {
        Ok(view) => (
            StatusCode::OK,
            Json(MsgBody {
                msg: rental_url(pool.config(), &view),
            }),
        )
            .into_response(),
        Err(err) => (
            status_for(err),
            Json(MsgBody {
                msg: err.to_string(),
            }),
        )
            .into_response(),
    }
}

pub(super) async fn info(State(pool): State<Arc<Pool>>) -> Json<InfoBody> {
    let config = pool.config();
    Json(InfoBody {
        parallel_creation: config.pool_parallel_creation,
        capacity: config.pool_capacity,
        size: config.pool_size,
        lifetime: humantime::format_duration(config.lifetime).to_string(),
    })
}

pub(super) async fn ready(State(pool): State<Arc<Pool>>) -> Json<ReadyBody> {
    Json(ReadyBody {
        msg: pool.is_ready(),
    })
}

pub(super) async fn metrics() -> Response {
    match metrics::gather() {
        Ok(buffer) => {
            let mut response = Response::new(Body::from(buffer));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

/// Downstream routing derives the target port by concatenating the slot id
/// to the literal `3132`; the id is intentionally not delimited.
fn rental_url(config: &Config, view: &SlotView) -> String {
    format!(
        "http://z:{}@{}:3132{}",
        view.key.as_deref().unwrap_or_default(),
        config.domain,
        view.id
    )
}

fn status_for(err: PoolError) -> StatusCode {
    match err {
        PoolError::Creating => StatusCode::ACCEPTED,
        // 509 Bandwidth Limit Exceeded
        PoolError::MaxParallelCreation => {
            StatusCode::from_u16(509).expect("509 is a valid status code")
        }
        PoolError::MaxCapacity => StatusCode::SERVICE_UNAVAILABLE,
    }
}
