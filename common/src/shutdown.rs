//! Process-wide cooperative shutdown.
//!
//! A [`StopSource`] is created once at startup; every long-running thread
//! holds a [`StopToken`] cloned from it. Threads either poll
//! [`StopToken::is_stop_requested`] at their cooperative checkpoints or park
//! in [`StopToken::wait_timeout`], an alertable sleep that wakes early when
//! stop is requested.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct StopShared {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

/// Owning side of the shutdown signal.
pub struct StopSource {
    shared: Arc<StopShared>,
}

/// Cloneable handle observed by the long-running threads.
#[derive(Clone)]
pub struct StopToken {
    shared: Arc<StopShared>,
}

impl StopSource {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(StopShared {
                stopped: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn token(&self) -> StopToken {
        StopToken {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Requests stop and wakes every sleeper.
    pub fn request_stop(&self) {
        let mut stopped = self.shared.stopped.lock();
        *stopped = true;
        self.shared.condvar.notify_all();
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    pub fn is_stop_requested(&self) -> bool {
        *self.shared.stopped.lock()
    }

    /// Sleeps up to `timeout` or until stop is requested.
    ///
    /// Returns `true` when stop was requested, `false` on a full sleep.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.shared.stopped.lock();
        while !*stopped {
            if self
                .shared
                .condvar
                .wait_until(&mut stopped, deadline)
                .timed_out()
            {
                return *stopped;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_observes_stop() {
        let source = StopSource::new();
        let token = source.token();
        assert!(!token.is_stop_requested());
        source.request_stop();
        assert!(token.is_stop_requested());
    }

    #[test]
    fn wait_times_out_without_stop() {
        let source = StopSource::new();
        let token = source.token();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_wakes_early_on_stop() {
        let source = StopSource::new();
        let token = source.token();

        let waiter = std::thread::spawn(move || {
            let start = Instant::now();
            let stopped = token.wait_timeout(Duration::from_secs(30));
            (stopped, start.elapsed())
        });

        std::thread::sleep(Duration::from_millis(30));
        source.request_stop();

        let (stopped, elapsed) = waiter.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn wait_returns_immediately_when_already_stopped() {
        let source = StopSource::new();
        source.request_stop();
        assert!(source.token().wait_timeout(Duration::from_secs(30)));
    }
}
