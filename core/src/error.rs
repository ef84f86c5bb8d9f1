// Copyright 2026 MX Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The error type shared by every component of the runtime.

use std::io;

/// Severity attached to an entry in an [`Exchange`](crate::exchange::Exchange)'s
/// error buffer. `Notice` is recoverable and execution continues; `Fatal`
/// means the condition that raised it is unrecoverable at the point it was
/// raised (though the exchange as a whole may still be shutting down
/// gracefully rather than panicking).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Notice,
    Fatal,
}

/// Flat error enum for the whole crate, in the style of the teacher's older
/// `p2p::types::Error` (itself a flat `enum Error` with per-variant `From`
/// impls) but derived with `thiserror` rather than hand-written `Display`/
/// `From` blocks, following the move later teacher crates already made away
/// from `failure`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("wire codec error: {0}")]
    Codec(#[from] crate::wire::Error),

    #[error("listen port {0} is already in use")]
    PortInUse(u16),

    #[error("could not connect to master at {host}:{port}")]
    MasterUnreachable { host: String, port: u16 },

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("message type {0} is reserved for built-in control messages")]
    ReservedType(u32),

    #[error("duplicate timer id {0}")]
    DuplicateTimer(u64),

    #[error("unknown timer id {0}")]
    UnknownTimer(u64),

    #[error("unknown command in worker queue")]
    ProtocolMisuse,

    #[error("the exchange is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, Error>;

/// A single entry in an [`Exchange`](crate::exchange::Exchange)'s error
/// buffer. Carried per-exchange rather than in a global, per the Design Note
/// preferring per-exchange storage over the source's single global buffer.
#[derive(Debug)]
pub struct ErrorEntry {
    pub severity: Severity,
    pub error: Error,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl ErrorEntry {
    pub fn new(severity: Severity, error: Error) -> Self {
        ErrorEntry {
            severity,
            error,
            at: chrono::Utc::now(),
        }
    }
}
