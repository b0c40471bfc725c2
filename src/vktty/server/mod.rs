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

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

mod auth;
mod handlers;

use crate::vktty::logger::{log, Level};
use crate::vktty::pool::Pool;
use crate::vktty::util::{DynError, Fault};

pub const PORT: u16 = 8042;

/// Assembles the façade. Every route is a one-liner over a pool method;
/// only the admin listing carries the basic-auth layer.
pub fn build_router(pool: Arc<Pool>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/ls", get(handlers::ls))
        .route("/get", get(handlers::lease))
        .route("/info", get(handlers::info))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/sudo/ls",
            get(handlers::sudo_ls).layer(middleware::from_fn_with_state(
                Arc::clone(&pool),
                auth::require_admin,
            )),
        )
        .with_state(pool)
}

pub async fn serve(pool: Arc<Pool>) -> Result<(), DynError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], PORT));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| Fault::wrap(err, format!("failed to bind server listener at {addr}")))?;

    let addr_text = addr.to_string();
    log(
        Level::Info,
        "server",
        "HTTP server listening",
        &[("addr", addr_text.as_str())],
    );

    axum::serve(listener, build_router(pool))
        .await
        .map_err(|err| Fault::wrap(err, "server terminated"))
}
