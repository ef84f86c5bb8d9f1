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

//! The timer engine: a dedicated worker thread holding a list of timers
//! sorted by absolute deadline, driven by a command queue so it can block
//! with `deadline = head.time` (or indefinitely when idle).
//!
//! Grounded on the original's `MX_Timer`/timer thread (`types.h`'s
//! `MX_Timer{id,t,handler,udata}` plus its `Create/Adjust/Delete/Exit`
//! command protocol) and on the teacher's pattern of a named worker thread
//! driven by a blocking queue (`p2p/src/serv.rs`'s `"p2p-monitor"` thread).

use crate::error::{Error, ErrorEntry, Severity};
use crate::event::Event;
use crate::queue::{Popped, Queue};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A timer callback. Runs on the event-loop thread, never on the timer
/// thread itself — see `Event::TimerFired` in [`crate::event`].
pub type TimerHandler = Box<dyn FnMut() + Send>;

enum Command {
    Create {
        id: u64,
        at: f64,
        handler: TimerHandler,
    },
    Adjust {
        id: u64,
        at: f64,
    },
    Delete {
        id: u64,
    },
    Exit,
}

struct Entry {
    id: u64,
    at: f64,
    handler: TimerHandler,
}

/// Returns the current time as seconds since the Unix epoch, the
/// representation `Timer::at` uses throughout (mirrors the original's
/// `double` seconds-since-epoch timestamps and `mxNow`).
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn at_to_instant(at: f64) -> Instant {
    let delta = at - now();
    if delta <= 0.0 {
        Instant::now()
    } else {
        Instant::now() + Duration::from_secs_f64(delta)
    }
}

/// A handle to the running timer thread. Dropping this does not stop the
/// thread; call [`TimerEngine::shutdown`] explicitly, as the exchange's
/// shutdown sequence does.
pub struct TimerEngine {
    commands: Arc<Queue<Command>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl TimerEngine {
    /// Spawns the timer thread. `events` is the event-loop's sender half of
    /// the event pipe; `errors` collects invariant-violation notices
    /// (duplicate/unknown timer ids) without tearing down the thread.
    pub fn spawn(events: Sender<Event>, errors: Arc<Mutex<Vec<ErrorEntry>>>) -> Self {
        let commands: Arc<Queue<Command>> = Arc::new(Queue::new());
        let worker_commands = commands.clone();
        let join = thread::Builder::new()
            .name("mx-timer".into())
            .spawn(move || run(worker_commands, events, errors))
            .expect("failed to spawn timer thread");
        TimerEngine {
            commands,
            join: Mutex::new(Some(join)),
        }
    }

    pub fn create(&self, id: u64, at: f64, handler: TimerHandler) {
        self.commands.push(Command::Create { id, at, handler });
    }

    pub fn adjust(&self, id: u64, at: f64) {
        self.commands.push(Command::Adjust { id, at });
    }

    pub fn delete(&self, id: u64) {
        self.commands.push(Command::Delete { id });
    }

    /// Pushes `Exit` and joins the worker. Safe to call more than once.
    pub fn shutdown(&self) {
        self.commands.push(Command::Exit);
        if let Some(handle) = self.join.lock().expect("timer join mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn run(commands: Arc<Queue<Command>>, events: Sender<Event>, errors: Arc<Mutex<Vec<ErrorEntry>>>) {
    let mut timers: Vec<Entry> = Vec::new();

    let mut record_error = |e: Error| {
        errors
            .lock()
            .expect("error buffer mutex poisoned")
            .push(ErrorEntry::new(Severity::Notice, e));
    };

    loop {
        let deadline = timers.first().map(|t| at_to_instant(t.at));
        match commands.pop(deadline) {
            Popped::Item(Command::Create { id, at, handler }) => {
                if timers.iter().any(|t| t.id == id) {
                    record_error(Error::DuplicateTimer(id));
                    continue;
                }
                timers.push(Entry { id, at, handler });
                timers.sort_by(|a, b| a.at.partial_cmp(&b.at).unwrap());
            }
            Popped::Item(Command::Adjust { id, at }) => {
                match timers.iter_mut().find(|t| t.id == id) {
                    Some(t) => t.at = at,
                    None => record_error(Error::UnknownTimer(id)),
                }
                timers.sort_by(|a, b| a.at.partial_cmp(&b.at).unwrap());
            }
            Popped::Item(Command::Delete { id }) => {
                let before = timers.len();
                timers.retain(|t| t.id != id);
                if timers.len() == before {
                    record_error(Error::UnknownTimer(id));
                }
            }
            Popped::Item(Command::Exit) => return,
            Popped::TimedOut => {
                // The head timer's deadline elapsed; fire it. A timer whose
                // time has already passed fires immediately on the next
                // iteration — no coalescing with timers behind it.
                if !timers.is_empty() {
                    let fired = timers.remove(0);
                    if events
                        .send(Event::TimerFired {
                            id: fired.id,
                            handler: fired.handler,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn fires_in_order() {
        let (tx, rx) = mpsc::channel();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let engine = TimerEngine::spawn(tx, errors);
        engine.create(1, now() + 0.05, Box::new(|| {}));
        engine.create(2, now() + 0.01, Box::new(|| {}));

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        engine.shutdown();

        match (first, second) {
            (Event::TimerFired { id: a, .. }, Event::TimerFired { id: b, .. }) => {
                assert_eq!(a, 2);
                assert_eq!(b, 1);
            }
            _ => panic!("expected TimerFired events"),
        }
    }

    #[test]
    fn duplicate_create_is_recorded_as_notice() {
        let (tx, _rx) = mpsc::channel();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let engine = TimerEngine::spawn(tx, errors.clone());
        engine.create(7, now() + 10.0, Box::new(|| {}));
        engine.create(7, now() + 10.0, Box::new(|| {}));
        thread::sleep(Duration::from_millis(50));
        engine.shutdown();
        assert_eq!(errors.lock().unwrap().len(), 1);
    }
}
