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

//! A thread-safe FIFO command queue with timed, absolute-deadline waits.
//!
//! The original's `MX_Queue` pairs a mutex-protected list with a counting
//! semaphore so a single consumer can block with a deadline. The idiomatic
//! Rust equivalent used throughout this crate (timer commands, writer
//! commands) is a `Mutex<VecDeque<T>>` plus a `Condvar`, which gives the same
//! "block until available or deadline" contract without a raw semaphore.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Outcome of a timed [`Queue::pop`].
pub enum Popped<T> {
    Item(T),
    TimedOut,
}

pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Queue {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Appends an item. Never blocks.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        items.push_back(item);
        self.available.notify_one();
    }

    /// Blocks until an item is available, or forever if `deadline` is
    /// `None`. With `Some(deadline)`, returns `Popped::TimedOut` if no item
    /// arrives by that absolute instant.
    pub fn pop(&self, deadline: Option<Instant>) -> Popped<T> {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        loop {
            if let Some(item) = items.pop_front() {
                return Popped::Item(item);
            }
            match deadline {
                None => {
                    items = self.available.wait(items).expect("queue mutex poisoned");
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Popped::TimedOut;
                    }
                    let (guard, timeout_result) = self
                        .available
                        .wait_timeout(items, deadline - now)
                        .expect("queue mutex poisoned");
                    items = guard;
                    if timeout_result.timed_out() && items.is_empty() {
                        return Popped::TimedOut;
                    }
                }
            }
        }
    }

    /// Non-blocking pop, used by the event loop to drain the event pipe
    /// without parking.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().expect("queue mutex poisoned").pop_front()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience for converting a relative wait into the absolute deadline
/// `pop` expects, mirroring how timers and awaits are specified in seconds
/// from "now" at the call site.
pub fn deadline_in(duration: Duration) -> Instant {
    Instant::now() + duration
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_then_pop_is_fifo() {
        let q: Queue<i32> = Queue::new();
        q.push(1);
        q.push(2);
        assert!(matches!(q.pop(None), Popped::Item(1)));
        assert!(matches!(q.pop(None), Popped::Item(2)));
    }

    #[test]
    fn pop_times_out_when_empty() {
        let q: Queue<i32> = Queue::new();
        let deadline = deadline_in(Duration::from_millis(20));
        assert!(matches!(q.pop(Some(deadline)), Popped::TimedOut));
    }

    #[test]
    fn pop_wakes_on_push_from_another_thread() {
        let q = Arc::new(Queue::<i32>::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            q2.push(42);
        });
        let deadline = deadline_in(Duration::from_secs(2));
        match q.pop(Some(deadline)) {
            Popped::Item(v) => assert_eq!(v, 42),
            Popped::TimedOut => panic!("should not time out"),
        }
        handle.join().unwrap();
    }
}
