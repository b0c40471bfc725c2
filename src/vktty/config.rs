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

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::vktty::util::{DynError, Fault};

const ENV_PREFIX: &str = "VKTTY_";

/// Runtime configuration, read once at startup from `VKTTY_`-prefixed
/// environment variables. Absent variables fall back to zero/empty values;
/// malformed ones abort startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a leased slot may live before the reclaim loop deletes it.
    pub lifetime: Duration,
    /// Number of warm (`Free`) slots the controller keeps pre-created.
    pub pool_capacity: usize,
    /// Length of the slot array; slot ids are `[0, pool_size)`.
    pub pool_size: usize,
    /// Upper bound on concurrent create subprocesses.
    pub pool_parallel_creation: usize,
    /// Domain advertised in rental URLs.
    pub domain: String,
    /// Admin credential for `/sudo/ls`; the literal `"dev"` switches the
    /// process into dev mode (text logs).
    pub blurb: String,
    /// Lifecycle script invoked as `<script> <action> <id>`.
    pub script_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, DynError> {
        Ok(Self {
            lifetime: duration_var("LIFETIME")?,
            pool_capacity: int_var("POOL_CAPACITY")?,
            pool_size: int_var("POOL_SIZE")?,
            pool_parallel_creation: int_var("POOL_PARALLEL_CREATION")?,
            domain: string_var("DOMAIN"),
            blurb: string_var("BLURB"),
            script_path: PathBuf::from(string_var("SCRIPT_PATH")),
        })
    }

    pub fn is_dev(&self) -> bool {
        self.blurb == "dev"
    }

    pub fn env_name(&self) -> &'static str {
        if self.is_dev() {
            "dev"
        } else {
            "prod"
        }
    }
}

fn string_var(name: &str) -> String {
    env::var(format!("{ENV_PREFIX}{name}")).unwrap_or_default()
}

fn int_var(name: &str) -> Result<usize, DynError> {
    let raw = string_var(name);
    if raw.is_empty() {
        return Ok(0);
    }
    raw.trim()
        .parse()
        .map_err(|err| Fault::wrap(err, format!("invalid {ENV_PREFIX}{name} '{raw}'")))
}

fn duration_var(name: &str) -> Result<Duration, DynError> {
    let raw = string_var(name);
    if raw.is_empty() {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(raw.trim())
        .map_err(|err| Fault::wrap(err, format!("invalid {ENV_PREFIX}{name} '{raw}'")))
}
