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

use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;

use crate::vktty::util::{DynError, Fault};

/// One roster entry as reported by the external listing tool. `status` is the
/// raw kube-side phase (`Running`, `Pending`, ...); adoption classifies it.
#[derive(Debug, Clone, Deserialize)]
pub struct ListedCluster {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Created", default)]
    pub created: Option<DateTime<Utc>>,
}

/// Enumerates the clusters that already exist outside the process. Only the
/// startup sync path calls this.
#[async_trait]
pub trait ClusterLister: Send + Sync {
    async fn list(&self) -> Result<Vec<ListedCluster>, DynError>;
}

/// Production lister shelling out to `vcluster ls --output=json`.
pub struct VclusterCli;

#[async_trait]
impl ClusterLister for VclusterCli {
    async fn list(&self) -> Result<Vec<ListedCluster>, DynError> {
        let output = Command::new("vcluster")
            .args(["ls", "--output=json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| Fault::wrap(err, "failed to run vcluster ls"))?;

        if !output.status.success() {
            return Err(Fault::new(format!(
                "vcluster ls exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|err| Fault::wrap(err, "failed to parse vcluster ls output"))
    }
}
