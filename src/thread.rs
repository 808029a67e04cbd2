//! Named OS thread with a cooperative stop signal.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::THREAD_STACK_SIZE;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::sync::Event;
use crate::sync::event::WAIT_INFINITE;

/// Handle passed to a thread's run function for stop cooperation.
///
/// Long-running loops must poll [`signalled`](StopToken::signalled) each
/// iteration and return promptly once it reports true.
#[derive(Clone)]
pub struct StopToken {
    stop: Arc<Event>,
}

impl StopToken {
    /// True once [`Thread::stop`] (or [`Thread::signal`]) has begun.
    pub fn signalled(&self) -> bool {
        self.stop.wait(0)
    }

    /// Block up to `timeout_ms` for the stop signal; true if signalled.
    pub fn wait(&self, timeout_ms: u32) -> bool {
        self.stop.wait(timeout_ms)
    }
}

/// Named OS thread with a user-supplied run function.
///
/// `start` is idempotent while the thread runs; after `stop` the handle is
/// reusable for a future `start`.
pub struct Thread {
    name: String,
    stop: Arc<Event>,
    done: Arc<Event>,
    handle: Option<JoinHandle<()>>,
    logger: Option<Arc<Logger>>,
}

impl Thread {
    pub fn new(name: impl Into<String>) -> Self {
        Thread {
            name: name.into(),
            stop: Arc::new(Event::new()),
            done: Arc::new(Event::new()),
            handle: None,
            logger: None,
        }
    }

    /// Attach a logger for lifecycle messages.
    pub fn set_logger(&mut self, logger: Option<Arc<Logger>>) {
        self.logger = logger;
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the run function has not returned.
    pub fn active(&self) -> bool {
        self.handle.is_some() && !self.done.wait(0)
    }

    /// Start the run function on a fresh OS thread.
    ///
    /// A second call while the thread is running is a no-op success. Spawn
    /// failure reports [`Error::Runtime`] and creates no thread.
    pub fn start<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&StopToken) + Send + 'static,
    {
        if let Some(handle) = self.handle.take() {
            if !self.done.wait(0) {
                // Still running.
                self.handle = Some(handle);
                return Ok(());
            }
            let _ = handle.join();
        }

        // Fresh events per run: an abandoned previous run keeps its own
        // pair and cannot see or corrupt this run's signals.
        self.stop = Arc::new(Event::new());
        self.done = Arc::new(Event::new());
        let token = StopToken {
            stop: self.stop.clone(),
        };
        let done = self.done.clone();

        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .stack_size(THREAD_STACK_SIZE)
            .spawn(move || {
                f(&token);
                done.signal();
            })
            .map_err(|e| {
                if let Some(logger) = &self.logger {
                    logger.error(&format!("create thread failure: {} ({e})", self.name));
                }
                Error::Runtime(format!("create thread failure: {e}"))
            })?;

        if let Some(logger) = &self.logger {
            logger.info(&format!("start thread: {}", self.name));
        }
        self.handle = Some(handle);
        Ok(())
    }

    /// Notify the run function to stop without waiting.
    pub fn signal(&self) {
        self.stop.signal();
    }

    /// Best-effort priority adjustment. Unsupported for the normal
    /// scheduling class on this platform; returns false.
    pub fn set_priority(&self, _priority: i32) -> bool {
        false
    }

    /// Signal the run function and wait up to `timeout_ms` milliseconds for
    /// it to return (`u32::MAX` waits forever).
    ///
    /// Returns true once the thread has been joined. A run function that
    /// ignores the signal past the timeout is abandoned and false is
    /// returned; the handle is reusable either way.
    pub fn stop(&mut self, timeout_ms: u32) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        if let Some(logger) = &self.logger {
            logger.info(&format!("stop thread: {}", self.name));
        }
        self.stop.signal();

        if self.done.wait(timeout_ms) {
            let _ = handle.join();
            if let Some(logger) = &self.logger {
                logger.info(&format!("thread is stopped: {}", self.name));
            }
            true
        } else {
            // The run function did not cooperate in time. There is no sound
            // forced termination; abandon the thread and reuse the handle.
            if let Some(logger) = &self.logger {
                logger.error(&format!(
                    "thread is alive: {}, abandoning it",
                    self.name
                ));
            }
            drop(handle);
            false
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.active() {
            self.stop(500);
        }
    }
}

/// Wait-forever timeout for [`Thread::stop`].
pub const STOP_WAIT_INFINITE: u32 = WAIT_INFINITE;
