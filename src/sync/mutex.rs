//! Recursive mutex with an RAII guard.

use std::sync::{Condvar, Mutex as StdMutex};
use std::thread::ThreadId;

struct LockState {
    owner: Option<ThreadId>,
    count: usize,
}

/// Recursive mutual-exclusion lock.
///
/// The owning thread may acquire any number of times; the lock is released
/// once every [`MutexGuard`] has been dropped. There is no try-lock.
pub struct Mutex {
    state: StdMutex<LockState>,
    cond: Condvar,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    pub fn new() -> Self {
        Mutex {
            state: StdMutex::new(LockState {
                owner: None,
                count: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Acquire the lock, blocking until it is free or already owned by the
    /// calling thread. Released when the returned guard drops.
    pub fn lock(&self) -> MutexGuard<'_> {
        let me = std::thread::current().id();
        let mut state = self.state.lock().unwrap();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.count = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.count += 1;
                    break;
                }
                Some(_) => {
                    state = self.cond.wait(state).unwrap();
                }
            }
        }
        MutexGuard { mutex: self }
    }

    fn unlock(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert_eq!(state.owner, Some(std::thread::current().id()));
        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            self.cond.notify_one();
        }
    }
}

/// Scoped guard: acquires on construction, releases on every exit path.
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
