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

//! Events carried on the internal event pipe: the tagged union the event
//! loop drains on its single consumer thread.
//!
//! The original keeps a literal `int event_pipe[2]` and posts pointer-sized
//! payloads through it; this crate uses `std::sync::mpsc` instead — the
//! Rust idiom for the same single-producer(s)/single-consumer design, and
//! the same substitution the teacher's later crates make wherever grin's
//! oldest code reached for a raw fd to signal between threads.

use crate::conn::Peer;
use crate::error::ErrorEntry;
use crate::timer::TimerHandler;
use std::sync::Arc;

/// Identifies a peer connection. On Unix this is the underlying TCP
/// socket's raw file descriptor, following the original's use of the fd
/// itself as the peer key (`MX_Component.fd`, the directory's fd-indexed
/// array).
pub type PeerId = std::os::unix::io::RawFd;

pub enum Event {
    /// A new inbound TCP connection was accepted and its reader/writer
    /// workers are already running; the event loop only needs to record it
    /// in the directory. Not yet named.
    Connect { peer: Arc<Peer> },

    /// `peer`'s socket closed. `graceful` distinguishes a clean EOF from a
    /// read/write error (both are handled the same way by the event loop,
    /// but the distinction is useful for logging).
    Disconnect { peer: PeerId, graceful: bool },

    /// A complete frame arrived from `peer` that did not match a pending
    /// `Await` on that peer.
    Message {
        peer: PeerId,
        msg_type: u32,
        version: u32,
        payload: Vec<u8>,
    },

    /// A timer's deadline elapsed. `handler` is the callback installed at
    /// creation time, moved out of the timer engine's list so the event
    /// loop is the only place it ever runs.
    TimerFired { id: u64, handler: TimerHandler },

    /// A background thread recorded a failure that the event loop should
    /// also see synchronously (in addition to the error buffer).
    Error { peer: Option<PeerId>, entry: ErrorEntry },
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Connect { peer } => f.debug_struct("Connect").field("peer", &peer.id).finish(),
            Event::Disconnect { peer, graceful } => f
                .debug_struct("Disconnect")
                .field("peer", peer)
                .field("graceful", graceful)
                .finish(),
            Event::Message {
                peer,
                msg_type,
                version,
                payload,
            } => f
                .debug_struct("Message")
                .field("peer", peer)
                .field("msg_type", msg_type)
                .field("version", version)
                .field("size", &payload.len())
                .finish(),
            Event::TimerFired { id, .. } => {
                f.debug_struct("TimerFired").field("id", id).finish()
            }
            Event::Error { peer, entry } => f
                .debug_struct("Error")
                .field("peer", peer)
                .field("entry", entry)
                .finish(),
        }
    }
}
