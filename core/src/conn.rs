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

//! Peer connections: one reader and one writer worker thread per TCP peer,
//! the peer's incoming subscription/await bookkeeping, and the await
//! rendezvous that lets a caller block for a specific reply without
//! touching the event loop.
//!
//! Grounded on the teacher's `p2p::conn::Connection` (reader/writer worker
//! pair, byte-counters via `transmitted_bytes`) and its later
//! `p2p::codec::Codec` (blocking `TcpStream` + `read_exact` frame-extraction
//! loop, `set_read_timeout`), adapted from a stateful codec object to the
//! stateless [`crate::wire::Frame`] plus a thin read loop here.

use crate::error::{Error, ErrorEntry, Severity};
use crate::event::{Event, PeerId};
use crate::queue::Queue;
use crate::wire::{Error as WireError, Frame};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The result an [`Await`](Peer::await_frame) is waiting for.
#[derive(Debug, Clone)]
pub struct AwaitResult {
    pub version: u32,
    pub payload: Vec<u8>,
}

enum WriterCommand {
    Write(Frame),
    Exit,
}

/// What the event loop knows about a peer beyond its connection plumbing.
/// Touched only from the event-loop thread, per the concurrency model.
#[derive(Debug, Default)]
pub struct PeerInfo {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub assigned_id: Option<u16>,
    pub subscriptions: HashSet<u32>,
}

/// A connected peer: its socket-facing worker threads plus the pending
/// await list the reader thread services directly.
pub struct Peer {
    pub id: PeerId,
    /// The peer's remote socket address as seen on our end of the TCP
    /// stream (the connecting address for inbound peers, the dialed
    /// address for outbound ones). Distinct from `PeerInfo::host`/`port`,
    /// which record the peer's *listening* address once it introduces
    /// itself via `HelloRequest`/`HelloUpdate`.
    pub peer_addr: SocketAddr,
    pub info: Mutex<PeerInfo>,
    writer: Arc<Queue<WriterCommand>>,
    awaits: RwLock<HashMap<u32, VecDeque<SyncSender<AwaitResult>>>>,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    reader_join: Mutex<Option<JoinHandle<()>>>,
    writer_join: Mutex<Option<JoinHandle<()>>>,
    /// A third clone of the socket, kept only so `shutdown_socket` can
    /// unblock the reader's blocking `read` without needing access to the
    /// stream the reader/writer threads already own.
    shutdown_handle: TcpStream,
}

impl Peer {
    /// Splits `stream` into reader/writer halves and spawns their worker
    /// threads. `events` is the event-loop's sender; frames that don't
    /// match a pending await are posted there as `Event::Message`, and
    /// worker failures are posted as `Event::Error`.
    pub fn spawn(stream: TcpStream, events: Sender<Event>) -> io::Result<Arc<Peer>> {
        let id = stream.as_raw_fd();
        let peer_addr = stream.peer_addr()?;
        let reader_stream = stream.try_clone()?;
        let shutdown_handle = stream.try_clone()?;
        let writer_stream = stream;

        let writer: Arc<Queue<WriterCommand>> = Arc::new(Queue::new());

        let peer = Arc::new(Peer {
            id,
            peer_addr,
            info: Mutex::new(PeerInfo::default()),
            writer: writer.clone(),
            awaits: RwLock::new(HashMap::new()),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            reader_join: Mutex::new(None),
            writer_join: Mutex::new(None),
            shutdown_handle,
        });

        let reader_peer = peer.clone();
        let reader_events = events.clone();
        let reader_join = thread::Builder::new()
            .name(format!("mx-reader-{}", id))
            .spawn(move || reader_loop(reader_stream, reader_peer, reader_events))
            .expect("failed to spawn reader thread");

        let writer_peer = peer.clone();
        let writer_join = thread::Builder::new()
            .name(format!("mx-writer-{}", id))
            .spawn(move || writer_loop(writer_stream, writer, writer_peer, events))
            .expect("failed to spawn writer thread");

        *peer.reader_join.lock().expect("reader join mutex poisoned") = Some(reader_join);
        *peer.writer_join.lock().expect("writer join mutex poisoned") = Some(writer_join);

        Ok(peer)
    }

    /// Non-blocking: enqueues a frame for the writer thread.
    pub fn send(&self, msg_type: u32, version: u32, payload: Vec<u8>) -> Result<(), WireError> {
        let frame = Frame::new(msg_type, version, payload)?;
        self.writer.push(WriterCommand::Write(frame));
        Ok(())
    }

    /// Registers an await for the next frame of `msg_type`, returning a
    /// handle to block on later. Split from the blocking wait so
    /// `SendAndWait` can install the await *before* sending the request —
    /// otherwise a fast peer could reply before we started waiting.
    pub fn register_await(&self, msg_type: u32) -> Receiver<AwaitResult> {
        let (tx, rx) = sync_channel(1);
        self.awaits
            .write()
            .expect("await list lock poisoned")
            .entry(msg_type)
            .or_default()
            .push_back(tx);
        rx
    }

    /// Blocks until `rx` resolves or `deadline` passes.
    pub fn wait_await(rx: Receiver<AwaitResult>, deadline: Instant) -> Option<AwaitResult> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        rx.recv_timeout(timeout).ok()
    }

    /// Registers an await for the next frame of `msg_type` and blocks the
    /// calling thread until it arrives or `deadline` passes. Concurrent
    /// awaits on the same type are serviced FIFO in the order the reader
    /// observes matching frames, since each call appends to the back of
    /// that type's queue.
    pub fn await_frame(&self, msg_type: u32, deadline: Instant) -> Option<AwaitResult> {
        let rx = self.register_await(msg_type);
        Self::wait_await(rx, deadline)
    }

    /// Called by the reader thread for every frame it pulls off the wire.
    /// Returns `true` if the frame matched a pending await (and was
    /// therefore *not* posted as an `Event::Message`).
    fn deliver_or_queue(&self, frame: &Frame, events: &Sender<Event>) -> bool {
        let matched = {
            let mut awaits = self.awaits.write().expect("await list lock poisoned");
            match awaits.get_mut(&frame.msg_type) {
                Some(waiters) if !waiters.is_empty() => waiters.pop_front(),
                _ => None,
            }
        };

        if let Some(waiter) = matched {
            let _ = waiter.send(AwaitResult {
                version: frame.version,
                payload: frame.payload.clone(),
            });
            true
        } else {
            let _ = events.send(Event::Message {
                peer: self.id,
                msg_type: frame.msg_type,
                version: frame.version,
                payload: frame.payload.clone(),
            });
            false
        }
    }

    /// Half-shuts the socket, unblocking the reader's blocking `read` (and
    /// any in-flight `write`) without tearing down the worker threads
    /// themselves — `join` does that. Part of the exchange's shutdown
    /// sequence.
    pub fn shutdown_socket(&self) {
        let _ = self.shutdown_handle.shutdown(Shutdown::Both);
    }

    pub fn transmitted_bytes(&self) -> (u64, u64) {
        (
            self.bytes_sent.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
        )
    }

    /// Pushes `Exit` to the writer and joins both worker threads. The
    /// reader is unblocked by the caller shutting down its half of the
    /// socket before calling this, per the exchange's shutdown sequence.
    pub fn join(&self) {
        self.writer.push(WriterCommand::Exit);
        if let Some(h) = self.writer_join.lock().expect("writer join mutex poisoned").take() {
            let _ = h.join();
        }
        if let Some(h) = self.reader_join.lock().expect("reader join mutex poisoned").take() {
            let _ = h.join();
        }
    }
}

fn reader_loop(mut stream: TcpStream, peer: Arc<Peer>, events: Sender<Event>) {
    loop {
        match Frame::read(&mut stream) {
            Ok(frame) => {
                peer.bytes_received.fetch_add(
                    crate::wire::HEADER_LEN as u64 + frame.payload.len() as u64,
                    Ordering::Relaxed,
                );
                peer.deliver_or_queue(&frame, &events);
            }
            Err(WireError::Io(e)) if is_eof(&e) => {
                let _ = events.send(Event::Disconnect {
                    peer: peer.id,
                    graceful: true,
                });
                return;
            }
            Err(e) => {
                log::warn!("peer {} read error: {}", peer.id, e);
                let _ = events.send(Event::Error {
                    peer: Some(peer.id),
                    entry: ErrorEntry::new(Severity::Fatal, Error::Codec(e)),
                });
                let _ = events.send(Event::Disconnect {
                    peer: peer.id,
                    graceful: false,
                });
                return;
            }
        }
    }
}

fn is_eof(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
}

fn writer_loop(
    mut stream: TcpStream,
    commands: Arc<Queue<WriterCommand>>,
    peer: Arc<Peer>,
    events: Sender<Event>,
) {
    loop {
        match commands.pop(None) {
            crate::queue::Popped::Item(WriterCommand::Write(frame)) => {
                let mut buf = Vec::with_capacity(crate::wire::HEADER_LEN + frame.payload.len());
                if let Err(e) = frame.write(&mut buf) {
                    log::warn!("peer {} failed to encode frame: {}", peer.id, e);
                    continue;
                }
                if let Err(e) = stream.write_all(&buf) {
                    log::warn!("peer {} write failed, writer exiting: {}", peer.id, e);
                    let _ = events.send(Event::Error {
                        peer: Some(peer.id),
                        entry: ErrorEntry::new(Severity::Notice, Error::Io(e)),
                    });
                    return;
                }
                peer.bytes_sent.fetch_add(buf.len() as u64, Ordering::Relaxed);
            }
            crate::queue::Popped::Item(WriterCommand::Exit) => return,
            crate::queue::Popped::TimedOut => unreachable!("writer queue has no deadline"),
        }
    }
}

/// A relative timeout converted to the absolute deadline [`Peer::await_frame`]
/// expects, mirroring the queue's own `deadline_in` helper.
pub fn deadline_in(duration: Duration) -> Instant {
    crate::queue::deadline_in(duration)
}
