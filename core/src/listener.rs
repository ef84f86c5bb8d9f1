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

//! The listener: binds the name-derived (or any free) port and spawns
//! [`Peer`] workers for each accepted connection, posting a `Connect` event
//! per peer.
//!
//! Grounded on the teacher's `p2p::serv::Server::listen`: a named worker
//! thread (`"p2p-monitor"` there, `"mx-listener"` here) driving a
//! non-blocking `accept()` poll loop gated by an `Arc<AtomicBool>` stop
//! flag, checked with a short sleep between attempts. The backlog control
//! (absent from `std::net::TcpListener::bind`) is grounded on the same
//! crate's `net2` dependency.

use crate::conn::Peer;
use crate::error::Error;
use crate::event::Event;
use net2::TcpBuilder;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct Listener {
    pub local_addr: SocketAddr,
    raw_fd: std::os::unix::io::RawFd,
    stop: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    /// Binds `addr` with the given backlog. Returns `Error::PortInUse` if
    /// the port is already taken — fatal for a master's constructor.
    pub fn bind(addr: SocketAddr, backlog: i32, events: Sender<Event>) -> Result<Self, Error> {
        let builder = if addr.is_ipv4() {
            TcpBuilder::new_v4()
        } else {
            TcpBuilder::new_v6()
        }
        .map_err(Error::Io)?;
        builder.reuse_address(true).map_err(Error::Io)?;
        builder.bind(addr).map_err(|_| Error::PortInUse(addr.port()))?;
        let listener = builder.listen(backlog).map_err(|_| Error::PortInUse(addr.port()))?;
        let local_addr = listener.local_addr().map_err(Error::Io)?;
        listener.set_nonblocking(true).map_err(Error::Io)?;
        let raw_fd = listener.as_raw_fd();

        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();
        let join = thread::Builder::new()
            .name("mx-listener".into())
            .spawn(move || run(listener, worker_stop, events))
            .expect("failed to spawn listener thread");

        Ok(Listener {
            local_addr,
            raw_fd,
            stop,
            join: Mutex::new(Some(join)),
        })
    }

    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.raw_fd
    }

    /// Stops accepting new connections and joins the listener thread. This
    /// also unblocks the accept loop itself; in-flight peers are shut down
    /// separately by the exchange's shutdown sequence.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join.lock().expect("listener join mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn run(listener: TcpListener, stop: Arc<AtomicBool>, events: Sender<Event>) {
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        match listener.accept() {
            Ok((stream, addr)) => {
                log::debug!("accepted connection from {}", addr);
                match Peer::spawn(stream, events.clone()) {
                    Ok(peer) => {
                        if events.send(Event::Connect { peer }).is_err() {
                            return;
                        }
                    }
                    Err(e) => log::warn!("failed to spawn peer workers for {}: {}", addr, e),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) => {
                log::warn!("listener accept error: {}", e);
                thread::sleep(Duration::from_millis(1));
            }
        }
    }
}
