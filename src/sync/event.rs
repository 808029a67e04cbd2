//! Manual-reset event with timed wait.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Wait forever.
pub const WAIT_INFINITE: u32 = u32::MAX;

/// Manual-reset signal with two states, clear and set, initially clear.
///
/// [`signal`](Event::signal) wakes every waiter and leaves the state set
/// until [`reset`](Event::reset); it is safe from any thread. A
/// [`wait`](Event::wait) with timeout 0 is a non-blocking poll and
/// `WAIT_INFINITE` waits indefinitely.
pub struct Event {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    pub fn new() -> Self {
        Event {
            state: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Return the event to the clear state.
    pub fn reset(&self) {
        let mut set = self.state.lock().unwrap();
        *set = false;
    }

    /// Set the event and wake all waiters.
    pub fn signal(&self) {
        let mut set = self.state.lock().unwrap();
        *set = true;
        self.cond.notify_all();
    }

    /// Wait until the event is set, up to `timeout_ms` milliseconds.
    ///
    /// Returns true if the state became set before the deadline. All
    /// waiters observe true once signalled, until the next `reset`.
    pub fn wait(&self, timeout_ms: u32) -> bool {
        let mut set = self.state.lock().unwrap();
        if *set {
            return true;
        }
        if timeout_ms == 0 {
            return false;
        }
        if timeout_ms == WAIT_INFINITE {
            while !*set {
                set = self.cond.wait(set).unwrap();
            }
            return true;
        }
        let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms as u64);
        while !*set {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self.cond.wait_timeout(set, deadline - now).unwrap();
            set = guard;
            if result.timed_out() && !*set {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn starts_clear() {
        let ev = Event::new();
        assert!(!ev.wait(0));
    }

    #[test]
    fn signal_then_wait_returns_true_until_reset() {
        let ev = Event::new();
        ev.signal();
        assert!(ev.wait(0));
        assert!(ev.wait(0));
        assert!(ev.wait(WAIT_INFINITE));
        ev.reset();
        assert!(!ev.wait(0));
    }

    #[test]
    fn timed_wait_times_out() {
        let ev = Event::new();
        let start = Instant::now();
        assert!(!ev.wait(50));
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn wakes_all_waiters() {
        let ev = Arc::new(Event::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let ev = ev.clone();
            handles.push(std::thread::spawn(move || ev.wait(5000)));
        }
        std::thread::sleep(Duration::from_millis(50));
        ev.signal();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }

    #[test]
    fn cross_thread_signal() {
        let ev = Arc::new(Event::new());
        let ev2 = ev.clone();
        let h = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            ev2.signal();
        });
        assert!(ev.wait(5000));
        h.join().unwrap();
    }
}
