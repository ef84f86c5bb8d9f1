//! Shared helpers for the end-to-end tests: driving several exchanges'
//! event loops without blocking, since `Exchange::run` would otherwise tie
//! up the test thread for good.

use mx_core::Exchange;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Repeatedly drains each exchange's queued events until `done` is true or
/// `timeout` elapses. Returns whether `done` held at the end.
pub fn pump(exchanges: &[&Arc<Exchange>], timeout: Duration, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        for exchange in exchanges {
            exchange.process_events();
        }
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return done();
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
