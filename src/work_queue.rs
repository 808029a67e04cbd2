//! Single-consumer FIFO of typed work items executed on a dedicated thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use crate::byte_stream::ByteStream;
use crate::error::Result;
use crate::sync::Event;
use crate::thread::{STOP_WAIT_INFINITE, StopToken, Thread};

/// Function executed for one work item.
pub type WorkFunc = fn(&mut Work);

/// One unit of work: an opaque token, a byte-stream payload, and an
/// optional function to run it with. Works without a function fall back to
/// the queue's default function.
pub struct Work {
    pub token: u64,
    pub payload: ByteStream,
    pub func: Option<WorkFunc>,
}

impl Work {
    pub fn new(func: WorkFunc) -> Self {
        Work {
            token: 0,
            payload: ByteStream::new(0),
            func: Some(func),
        }
    }

    /// Work carrying a copy of `data` as its payload.
    pub fn with_payload(func: WorkFunc, data: &[u8]) -> Self {
        let mut work = Self::new(func);
        work.payload.append(data);
        work
    }

    /// Work identified by `token`, for later [`WorkQueue::cancel`].
    pub fn with_token(mut self, token: u64) -> Self {
        self.token = token;
        self
    }
}

struct QueueState {
    list: StdMutex<VecDeque<Work>>,
    queue_event: Event,
    working: AtomicBool,
    default_func: StdMutex<Option<WorkFunc>>,
}

/// Single-consumer work queue.
///
/// Producers enqueue from any thread; one worker thread drains in FIFO
/// order. The worker wakes on the queue event and re-checks its stop
/// signal at least every 200 ms.
pub struct WorkQueue {
    state: Arc<QueueState>,
    thread: Thread,
}

impl WorkQueue {
    pub fn new(name: impl Into<String>) -> Self {
        WorkQueue {
            state: Arc::new(QueueState {
                list: StdMutex::new(VecDeque::new()),
                queue_event: Event::new(),
                working: AtomicBool::new(false),
                default_func: StdMutex::new(None),
            }),
            thread: Thread::new(name),
        }
    }

    /// Start the consumer thread. Idempotent while running.
    pub fn start(&mut self) -> Result<()> {
        let state = self.state.clone();
        self.thread.start(move |token| run(&state, token))
    }

    /// Stop the consumer thread; queued works stay queued.
    pub fn stop(&mut self) {
        self.thread.stop(STOP_WAIT_INFINITE);
    }

    /// Fallback function for works queued without one.
    pub fn set_default_work_func(&self, func: WorkFunc) {
        *self.state.default_func.lock().unwrap() = Some(func);
    }

    /// Append a work item and wake the consumer.
    pub fn queue_work(&self, work: Work) {
        let mut list = self.state.list.lock().unwrap();
        list.push_back(work);
        self.state.queue_event.signal();
    }

    /// Remove still-queued works with the given token. Returns how many
    /// were removed; a work already executing is not affected.
    pub fn cancel(&self, token: u64) -> usize {
        let mut list = self.state.list.lock().unwrap();
        let before = list.len();
        list.retain(|w| w.token != token);
        before - list.len()
    }

    /// Number of works waiting to execute.
    pub fn pending_count(&self) -> usize {
        self.state.list.lock().unwrap().len()
    }

    /// True when no work is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    /// True when no work is waiting and none is executing.
    pub fn is_idle(&self) -> bool {
        let list = self.state.list.lock().unwrap();
        list.is_empty() && !self.state.working.load(Ordering::Acquire)
    }

    /// Drop every pending work without executing it.
    pub fn flush(&self) {
        self.state.list.lock().unwrap().clear();
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(state: &QueueState, token: &StopToken) {
    while !token.signalled() {
        if !state.queue_event.wait(200) {
            continue;
        }
        state.queue_event.reset();

        while !token.signalled() {
            let work = {
                let mut list = state.list.lock().unwrap();
                match list.pop_front() {
                    Some(work) => {
                        state.working.store(true, Ordering::Release);
                        work
                    }
                    None => break,
                }
            };
            let mut work = work;
            let func = work.func.or(*state.default_func.lock().unwrap());
            if let Some(func) = func {
                func(&mut work);
            }
            state.working.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    static EXECUTED: StdMutex<Vec<u64>> = StdMutex::new(Vec::new());
    static DEFAULT_RUNS: AtomicUsize = AtomicUsize::new(0);

    fn record(work: &mut Work) {
        EXECUTED.lock().unwrap().push(work.token);
    }

    fn count_default(_work: &mut Work) {
        DEFAULT_RUNS.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_until_idle(queue: &WorkQueue) {
        for _ in 0..200 {
            if queue.is_idle() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("work queue never drained");
    }

    #[test]
    #[serial(work_queue_log)]
    fn executes_in_fifo_order() {
        EXECUTED.lock().unwrap().clear();
        let mut queue = WorkQueue::new("wq-fifo");
        queue.start().unwrap();
        for token in 1..=5u64 {
            queue.queue_work(Work::new(record).with_token(token));
        }
        wait_until_idle(&queue);
        queue.stop();
        assert_eq!(*EXECUTED.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    #[serial(work_queue_log)]
    fn payload_reaches_work_func() {
        fn check(work: &mut Work) {
            assert_eq!(work.payload.as_slice(), b"payload-bytes");
            EXECUTED.lock().unwrap().push(work.token);
        }
        EXECUTED.lock().unwrap().clear();
        let mut queue = WorkQueue::new("wq-payload");
        queue.start().unwrap();
        queue.queue_work(Work::with_payload(check, b"payload-bytes").with_token(9));
        wait_until_idle(&queue);
        queue.stop();
        assert_eq!(*EXECUTED.lock().unwrap(), vec![9]);
    }

    #[test]
    fn default_func_runs_unlabelled_work() {
        DEFAULT_RUNS.store(0, Ordering::SeqCst);
        let mut queue = WorkQueue::new("wq-default");
        queue.set_default_work_func(count_default);
        queue.start().unwrap();
        queue.queue_work(Work {
            token: 0,
            payload: ByteStream::new(0),
            func: None,
        });
        wait_until_idle(&queue);
        queue.stop();
        assert_eq!(DEFAULT_RUNS.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[serial(work_queue_log)]
    fn cancel_removes_queued_work() {
        EXECUTED.lock().unwrap().clear();
        let mut queue = WorkQueue::new("wq-cancel");
        // Not started: everything stays queued.
        queue.queue_work(Work::new(record).with_token(1));
        queue.queue_work(Work::new(record).with_token(2));
        queue.queue_work(Work::new(record).with_token(1));
        assert_eq!(queue.pending_count(), 3);
        assert_eq!(queue.cancel(1), 2);
        assert_eq!(queue.pending_count(), 1);
        queue.start().unwrap();
        wait_until_idle(&queue);
        queue.stop();
        assert_eq!(*EXECUTED.lock().unwrap(), vec![2]);
    }

    #[test]
    fn flush_discards_pending() {
        let mut queue = WorkQueue::new("wq-flush");
        queue.queue_work(Work::new(record).with_token(1));
        queue.queue_work(Work::new(record).with_token(2));
        queue.flush();
        assert!(queue.is_empty());
        queue.start().unwrap();
        queue.stop();
    }
}
