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

use std::process;
use std::sync::Arc;

use vktty::vktty::config::Config;
use vktty::vktty::logger::{log, Level};
use vktty::vktty::pool::executor::ScriptExecutor;
use vktty::vktty::pool::lister::VclusterCli;
use vktty::vktty::pool::{reclaim, Pool};
use vktty::vktty::server;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("vktty: failed to process environment: {err}");
            process::exit(1);
        }
    };

    vktty::vktty::logger::init(config.is_dev());

    let config_text = format!("{config:?}");
    log(
        Level::Info,
        "main",
        "Start",
        &[
            ("env", config.env_name()),
            ("config", config_text.as_str()),
        ],
    );

    let runner = Arc::new(ScriptExecutor::new(config.script_path.clone()));
    let pool = Pool::new(config, runner);

    pool.bootstrap(Arc::new(VclusterCli)).await;
    reclaim::spawn(Arc::clone(&pool));

    if let Err(err) = server::serve(pool).await {
        let err_text = err.to_string();
        log(
            Level::Error,
            "main",
            "Server failed",
            &[("error", err_text.as_str())],
        );
        process::exit(1);
    }
}
