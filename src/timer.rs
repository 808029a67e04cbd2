//! Periodic callback timer, default and high-resolution classes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use crate::sync::Event;
use crate::sync::event::WAIT_INFINITE;
use crate::thread::{STOP_WAIT_INFINITE, StopToken, Thread};

/// Timer resolution class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerClass {
    /// Millisecond-class ticks driven by a shared host thread.
    Default,
    /// Dedicated thread per timer; sub-millisecond waits where the
    /// platform permits.
    HighResolution,
}

struct TimerShared {
    span_ms: AtomicU64,
    active: AtomicBool,
    /// Set while no callback is executing. Cleared for the duration of a
    /// tick; `activate(false)` waits on it.
    not_running: Event,
    callback: StdMutex<Box<dyn FnMut() + Send>>,
    next_due: StdMutex<Instant>,
}

impl TimerShared {
    /// Run one tick unless the previous callback is still executing.
    fn fire(&self) {
        if !self.not_running.wait(0) {
            // Previous tick still in its callback: suppress this one.
            return;
        }
        self.not_running.reset();
        if self.active.load(Ordering::Acquire) {
            (self.callback.lock().unwrap())();
        }
        self.not_running.signal();
    }
}

/// Periodic timer: invokes its callback after every `span_ms` milliseconds
/// while activated.
///
/// Re-entrancy is prevented: a tick due while the previous callback is
/// still executing is suppressed. `activate(false)` stops the timer and
/// waits until any in-flight callback has returned.
pub struct Timer {
    shared: Arc<TimerShared>,
    class: TimerClass,
    started: bool,
    hr_thread: Option<Thread>,
}

impl Timer {
    /// Create an inactive timer. A zero `span_ms` is coerced to 1000.
    pub fn new<F>(span_ms: u64, class: TimerClass, callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let span_ms = if span_ms == 0 { 1000 } else { span_ms };
        Timer {
            shared: Arc::new(TimerShared {
                span_ms: AtomicU64::new(span_ms),
                active: AtomicBool::new(false),
                not_running: Event::new(),
                callback: StdMutex::new(Box::new(callback)),
                next_due: StdMutex::new(Instant::now()),
            }),
            class,
            started: false,
            hr_thread: None,
        }
    }

    /// Configured interval in milliseconds.
    pub fn span_ms(&self) -> u64 {
        self.shared.span_ms.load(Ordering::Relaxed)
    }

    /// Start (`true`) or stop (`false`) the timer. Idempotent per
    /// direction. A failed start returns false and leaves the timer
    /// inactive; stopping waits for any in-flight callback to return.
    pub fn activate(&mut self, open: bool) -> bool {
        if open == self.started {
            return true;
        }
        if open {
            self.shared.not_running.signal();
            self.shared.active.store(true, Ordering::Release);
            let span = Duration::from_millis(self.shared.span_ms.load(Ordering::Relaxed));
            *self.shared.next_due.lock().unwrap() = Instant::now() + span;

            let ok = match self.class {
                TimerClass::Default => host::register(self.shared.clone()),
                TimerClass::HighResolution => {
                    let shared = self.shared.clone();
                    let mut thread =
                        Thread::new(format!("litenet-timer-{}ms", self.span_ms()));
                    let ok = thread.start(move |token| hr_run(shared, token)).is_ok();
                    if ok {
                        self.hr_thread = Some(thread);
                    }
                    ok
                }
            };
            if !ok {
                self.shared.active.store(false, Ordering::Release);
            }
            self.started = ok;
            ok
        } else {
            self.shared.active.store(false, Ordering::Release);
            match self.class {
                TimerClass::Default => host::deregister(&self.shared),
                TimerClass::HighResolution => {
                    if let Some(mut thread) = self.hr_thread.take() {
                        thread.stop(STOP_WAIT_INFINITE);
                    }
                }
            }
            self.shared.not_running.wait(WAIT_INFINITE);
            self.started = false;
            true
        }
    }

    /// Reconfigure and start in one call. A no-op success while running.
    pub fn activate_with(&mut self, span_ms: u64, class: TimerClass) -> bool {
        if self.started {
            return true;
        }
        let span_ms = if span_ms == 0 { 1000 } else { span_ms };
        self.shared.span_ms.store(span_ms, Ordering::Relaxed);
        self.class = class;
        self.activate(true)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.activate(false);
    }
}

/// Run loop for a high-resolution timer's dedicated thread.
fn hr_run(shared: Arc<TimerShared>, token: &StopToken) {
    let span = Duration::from_millis(shared.span_ms.load(Ordering::Relaxed)).max(
        // Sub-millisecond spans still need a non-zero wait.
        Duration::from_micros(100),
    );
    loop {
        let due = Instant::now() + span;
        // Event waits are millisecond-class; trim the tail with a
        // fine-grained sleep for sub-ms accuracy.
        let coarse = span.as_millis() as u32;
        if coarse > 0 && token.wait(coarse) {
            return;
        }
        while Instant::now() < due {
            if token.signalled() {
                return;
            }
            std::thread::sleep(Duration::from_micros(50));
        }
        if token.signalled() {
            return;
        }
        shared.fire();
    }
}

/// Process-wide host thread for `TimerClass::Default` timers, lazily
/// created and torn down when the last registered timer deactivates.
mod host {
    use super::*;

    struct Host {
        thread: Thread,
        timers: Arc<StdMutex<Vec<Arc<TimerShared>>>>,
    }

    static HOST: StdMutex<Option<Host>> = StdMutex::new(None);

    pub(super) fn register(timer: Arc<TimerShared>) -> bool {
        let mut guard = HOST.lock().unwrap();
        if guard.is_none() {
            let timers: Arc<StdMutex<Vec<Arc<TimerShared>>>> =
                Arc::new(StdMutex::new(Vec::new()));
            let run_timers = timers.clone();
            let mut thread = Thread::new("litenet-timer-host");
            if thread
                .start(move |token| host_run(run_timers, token))
                .is_err()
            {
                return false;
            }
            *guard = Some(Host { thread, timers });
        }
        let host = guard.as_ref().unwrap();
        host.timers.lock().unwrap().push(timer);
        true
    }

    pub(super) fn deregister(timer: &Arc<TimerShared>) {
        let mut guard = HOST.lock().unwrap();
        let Some(host) = guard.as_mut() else {
            return;
        };
        let empty = {
            let mut timers = host.timers.lock().unwrap();
            timers.retain(|t| !Arc::ptr_eq(t, timer));
            timers.is_empty()
        };
        if empty {
            let mut host = guard.take().unwrap();
            host.thread.stop(STOP_WAIT_INFINITE);
        }
    }

    fn host_run(timers: Arc<StdMutex<Vec<Arc<TimerShared>>>>, token: &StopToken) {
        while !token.signalled() {
            let now = Instant::now();
            let mut due = Vec::new();
            let mut next_wake = Duration::from_millis(50);
            {
                let list = timers.lock().unwrap();
                for timer in list.iter() {
                    let mut next_due = timer.next_due.lock().unwrap();
                    if now >= *next_due {
                        let span =
                            Duration::from_millis(timer.span_ms.load(Ordering::Relaxed));
                        *next_due = now + span;
                        next_wake = next_wake.min(span);
                        due.push(timer.clone());
                    } else {
                        next_wake = next_wake.min(*next_due - now);
                    }
                }
            }
            // Fire outside the registry lock.
            for timer in due {
                timer.fire();
            }
            let wait_ms = (next_wake.as_millis() as u32).clamp(1, 50);
            if token.wait(wait_ms) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::AtomicUsize;

    #[test]
    #[serial]
    fn default_class_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut timer = Timer::new(50, TimerClass::Default, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.activate(true));
        std::thread::sleep(Duration::from_millis(600));
        assert!(timer.activate(false));
        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 3, "expected at least 3 ticks, got {ticks}");
        // No further ticks after deactivation.
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), ticks);
    }

    #[test]
    #[serial]
    fn high_resolution_class_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut timer = Timer::new(10, TimerClass::HighResolution, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.activate(true));
        std::thread::sleep(Duration::from_millis(300));
        assert!(timer.activate(false));
        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 5, "expected at least 5 ticks, got {ticks}");
    }

    #[test]
    #[serial]
    fn deactivate_waits_for_in_flight_callback() {
        let in_callback = Arc::new(AtomicBool::new(false));
        let flag = in_callback.clone();
        let mut timer = Timer::new(20, TimerClass::Default, move || {
            flag.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(150));
            flag.store(false, Ordering::SeqCst);
        });
        assert!(timer.activate(true));
        // Let at least one tick begin.
        std::thread::sleep(Duration::from_millis(100));
        assert!(timer.activate(false));
        assert!(
            !in_callback.load(Ordering::SeqCst),
            "activate(false) returned while a callback was executing"
        );
    }

    #[test]
    #[serial]
    fn reentrancy_is_suppressed() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (c, p) = (concurrent.clone(), peak.clone());
        let mut timer = Timer::new(10, TimerClass::Default, move || {
            let level = c.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(level, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(60));
            c.fetch_sub(1, Ordering::SeqCst);
        });
        assert!(timer.activate(true));
        std::thread::sleep(Duration::from_millis(400));
        assert!(timer.activate(false));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[serial]
    fn activate_is_idempotent_per_direction() {
        let mut timer = Timer::new(1000, TimerClass::Default, || {});
        assert!(timer.activate(false));
        assert!(timer.activate(true));
        assert!(timer.activate(true));
        assert!(timer.activate(false));
        assert!(timer.activate(false));
    }

    #[test]
    #[serial]
    fn zero_span_coerced() {
        let timer = Timer::new(0, TimerClass::Default, || {});
        assert_eq!(timer.span_ms(), 1000);
    }
}
