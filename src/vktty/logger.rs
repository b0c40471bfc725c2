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

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

const SERVICE_NAME: &str = "vktty";

/// Severity of a log line. `Warn` and above land on stderr.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Level::Warn | Level::Error)
    }
}

/// Dev mode renders key=value text, production one JSON object per line.
/// Text is the default until `init` runs.
static TEXT_MODE: AtomicBool = AtomicBool::new(true);

pub fn init(dev_mode: bool) {
    TEXT_MODE.store(dev_mode, Ordering::Relaxed);
}

/// Emits one structured line: the fixed fields (`ts`, `level`, `service`,
/// `component`, `msg`) followed by the caller's metadata pairs, in whichever
/// format `init` selected.
pub fn log(level: Level, component: &str, message: &str, fields: &[(&str, &str)]) {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut pairs: Vec<(&str, &str)> = vec![
        ("ts", timestamp.as_str()),
        ("level", level.label()),
        ("service", SERVICE_NAME),
        ("component", component),
        ("msg", message),
    ];
    pairs.extend(fields.iter().filter(|(key, _)| !key.is_empty()).copied());

    let line = if TEXT_MODE.load(Ordering::Relaxed) {
        render_text(&pairs)
    } else {
        render_json(&pairs)
    };
    deliver(level, &line);
}

fn render_text(pairs: &[(&str, &str)]) -> String {
    let mut line = String::new();
    for (key, value) in pairs {
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(key);
        line.push('=');
        if needs_quoting(value) {
            // JSON string syntax doubles as the quoting rule for text lines.
            line.push_str(&Value::from(*value).to_string());
        } else {
            line.push_str(value);
        }
    }
    line
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "\"\\=[]{},".contains(c))
}

fn render_json(pairs: &[(&str, &str)]) -> String {
    let mut object = Map::new();
    for (key, value) in pairs {
        object.insert((*key).to_string(), Value::from(*value));
    }
    Value::Object(object).to_string()
}

#[cfg(not(test))]
fn deliver(level: Level, line: &str) {
    use std::io::Write;

    let written = if level.to_stderr() {
        writeln!(std::io::stderr().lock(), "{line}")
    } else {
        writeln!(std::io::stdout().lock(), "{line}")
    };
    // stdout may be a closed pipe; stderr is the last resort.
    if written.is_err() && !level.to_stderr() {
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }
}

#[cfg(test)]
fn deliver(level: Level, line: &str) {
    capture_store()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push((level, line.to_string()));
}

#[cfg(test)]
fn capture_store() -> &'static Mutex<Vec<(Level, String)>> {
    static STORE: OnceLock<Mutex<Vec<(Level, String)>>> = OnceLock::new();
    STORE.get_or_init(|| Mutex::new(Vec::new()))
}

/// Drains every line captured so far. Test builds only.
#[cfg(test)]
pub fn drain_captured() -> Vec<(Level, String)> {
    capture_store()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .drain(..)
        .collect()
}
