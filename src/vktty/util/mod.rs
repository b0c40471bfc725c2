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

use std::error::Error;
use std::fmt;

/// Boxed error type threaded through fallible paths that do not need a
/// dedicated error enum.
pub type DynError = Box<dyn Error + Send + Sync>;

/// One error type covering both shapes this crate needs: a bare message, or
/// a message prefixed onto an underlying cause. The cause stays reachable
/// through `Error::source`.
#[derive(Debug)]
pub struct Fault {
    message: String,
    cause: Option<DynError>,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> DynError {
        Box::new(Self {
            message: message.into(),
            cause: None,
        })
    }

    pub fn wrap(cause: impl Into<DynError>, message: impl Into<String>) -> DynError {
        Box::new(Self {
            message: message.into(),
            cause: Some(cause.into()),
        })
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn Error + 'static))
    }
}
