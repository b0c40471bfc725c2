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

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Steady states of a pool slot. Kube statuses observed during adoption
/// (`Running`, `Pending`, ...) are classified into this set and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Creating,
    Free,
    Locked,
    Deleting,
    Error,
    #[serde(rename = "EOL")]
    Eol,
}

/// Every status, in a fixed order usable for gauge publication.
pub const ALL_STATUSES: [Status; 6] = [
    Status::Creating,
    Status::Free,
    Status::Locked,
    Status::Deleting,
    Status::Error,
    Status::Eol,
];

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Creating => "Creating",
            Status::Free => "Free",
            Status::Locked => "Locked",
            Status::Deleting => "Deleting",
            Status::Error => "Error",
            Status::Eol => "EOL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slot of the pool. The `key` is the cluster credential returned by the
/// lifecycle script; it never leaves the process except through `/sudo/ls`
/// and the rental URL.
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: usize,
    pub name: String,
    pub status: Status,
    pub leased_at: Option<DateTime<Utc>>,
    pub key: String,
}

impl Slot {
    pub fn new(id: usize, status: Status) -> Self {
        Self {
            id,
            name: slot_name(id),
            status,
            leased_at: None,
            key: String::new(),
        }
    }

    /// True once the lease has outlived the configured lifetime.
    pub fn is_eol(&self, lifetime: Duration, now: DateTime<Utc>) -> bool {
        match self.leased_at {
            Some(leased_at) => now
                .signed_duration_since(leased_at)
                .to_std()
                .map(|age| age > lifetime)
                .unwrap_or(false),
            None => false,
        }
    }

    /// True when the reclaim loop should move this slot into `Deleting`.
    /// A slot already in `Deleting` is never deletable again; no double-delete.
    pub fn is_deletable(&self, lifetime: Duration, now: DateTime<Utc>) -> bool {
        if self.status == Status::Deleting {
            return false;
        }
        self.is_eol(lifetime, now) || matches!(self.status, Status::Error | Status::Eol)
    }

    /// Public projection with the credential elided.
    pub fn view(&self) -> SlotView {
        SlotView {
            name: self.name.clone(),
            id: self.id,
            leased_at: self.leased_at,
            key: None,
            status: self.status,
        }
    }

    /// Projection carrying the credential. Used by the admin listing and by
    /// admission, which embeds the key into the rental URL.
    pub fn view_with_key(&self) -> SlotView {
        let mut view = self.view();
        if !self.key.is_empty() {
            view.key = Some(self.key.clone());
        }
        view
    }
}

/// Wire shape of a slot, field names matching the external roster tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotView {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ID")]
    pub id: usize,
    #[serde(rename = "Created", skip_serializing_if = "Option::is_none")]
    pub leased_at: Option<DateTime<Utc>>,
    #[serde(rename = "Key", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "Status")]
    pub status: Status,
}

/// Canonical external name of a slot.
pub fn slot_name(id: usize) -> String {
    format!("c{id}")
}

/// Inverse of [`slot_name`].
pub fn parse_slot_id(name: &str) -> Option<usize> {
    name.strip_prefix('c')?.parse().ok()
}
