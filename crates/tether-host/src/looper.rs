//! Main-loop message queue
//!
//! Messages are closures with a due time, ordered by `(due, sequence)` in a
//! min-heap. The loop is pumped either by whoever calls
//! [`MainLoop::run_pending`] / [`MainLoop::run_until_idle`], or by a
//! background thread started with [`MainLoop::start`]. The queue lock is
//! never held while a task runs, so tasks may post further messages.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Unit of work posted to the loop
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Upper bound on one idle wait of the background thread
const IDLE_WAIT: Duration = Duration::from_millis(50);

struct Message {
    due: Instant,
    seq: u64,
    task: Task,
}

// Reverse ordering for min-heap (earliest due first, then FIFO)
impl Ord for Message {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Message {}

struct LoopShared {
    queue: Mutex<BinaryHeap<Message>>,
    notify: Condvar,
    next_seq: AtomicU64,
    running: AtomicBool,
}

/// Cloneable handle to one message loop.
#[derive(Clone)]
pub struct MainLoop {
    shared: Arc<LoopShared>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MainLoop {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(LoopShared {
                queue: Mutex::new(BinaryHeap::new()),
                notify: Condvar::new(),
                next_seq: AtomicU64::new(0),
                running: AtomicBool::new(false),
            }),
            thread: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `task` as soon as the loop is pumped
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.post_delayed(task, Duration::ZERO);
    }

    /// Run `task` once `delay` has elapsed
    pub fn post_delayed(&self, task: impl FnOnce() + Send + 'static, delay: Duration) {
        let seq = self.shared.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        let message = Message {
            due: Instant::now() + delay,
            seq,
            task: Box::new(task),
        };
        self.shared.queue.lock().push(message);
        self.shared.notify.notify_all();
    }

    /// Messages not yet run
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Run every message that is due now and was posted before this call.
    ///
    /// Messages posted by the tasks themselves wait for the next pump, so a
    /// task that reposts itself cannot starve the caller.
    pub fn run_pending(&self) -> usize {
        let horizon = self.shared.next_seq.load(AtomicOrdering::Acquire);
        let now = Instant::now();
        let mut ran = 0;
        loop {
            let task = {
                let mut queue = self.shared.queue.lock();
                let ready = matches!(
                    queue.peek(),
                    Some(next) if next.due <= now && next.seq < horizon
                );
                if ready {
                    queue.pop().map(|message| message.task)
                } else {
                    None
                }
            };
            let Some(task) = task else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Pump until the queue is empty or `timeout` elapses, sleeping until
    /// the next message is due. Returns the number of tasks run.
    pub fn run_until_idle(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        loop {
            ran += self.run_pending();
            let mut queue = self.shared.queue.lock();
            let Some(next_due) = queue.peek().map(|m| m.due) else {
                break;
            };
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if next_due > now {
                let wake = next_due.min(deadline);
                self.shared.notify.wait_until(&mut queue, wake);
            }
        }
        ran
    }

    /// Pump from a background thread until [`MainLoop::stop`]
    pub fn start(&self) -> std::io::Result<()> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Ok(());
        }
        self.shared.running.store(true, AtomicOrdering::Release);
        let looper = self.clone_detached();
        let handle = thread::Builder::new()
            .name("tether-main-loop".to_string())
            .spawn(move || looper.run_loop())?;
        *slot = Some(handle);
        tracing::debug!("main loop thread started");
        Ok(())
    }

    /// Stop the background thread, if any, and wait for it to exit
    pub fn stop(&self) {
        self.shared.running.store(false, AtomicOrdering::Release);
        self.shared.notify.notify_all();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
            tracing::debug!("main loop thread stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(AtomicOrdering::Acquire)
    }

    /// Handle that shares the queue but not the join slot
    fn clone_detached(&self) -> MainLoop {
        MainLoop {
            shared: Arc::clone(&self.shared),
            thread: Arc::new(Mutex::new(None)),
        }
    }

    fn run_loop(&self) {
        while self.is_running() {
            self.run_pending();
            let mut queue = self.shared.queue.lock();
            // Re-check under the lock so a stop() between the checks is not lost
            if !self.is_running() {
                break;
            }
            let now = Instant::now();
            let wait = match queue.peek() {
                Some(next) if next.due <= now => continue,
                Some(next) => (next.due - now).min(IDLE_WAIT),
                None => IDLE_WAIT,
            };
            self.shared.notify.wait_for(&mut queue, wait);
        }
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoop")
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_run_pending_in_due_order() {
        let looper = MainLoop::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            looper.post(move || order.lock().push(i));
        }
        assert_eq!(looper.run_pending(), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_delayed_message_waits() {
        let looper = MainLoop::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        looper.post_delayed(
            move || {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
            },
            Duration::from_millis(30),
        );
        assert_eq!(looper.run_pending(), 0);
        assert_eq!(looper.run_until_idle(Duration::from_secs(2)), 1);
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_reposted_message_deferred_to_next_pump() {
        let looper = MainLoop::new();
        let inner = looper.clone();
        looper.post(move || inner.post(|| {}));
        assert_eq!(looper.run_pending(), 1);
        assert_eq!(looper.pending(), 1);
        assert_eq!(looper.run_pending(), 1);
    }

    #[test]
    fn test_background_thread() {
        let looper = MainLoop::new();
        looper.start().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        looper.post(move || {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        });
        let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(name.as_deref(), Some("tether-main-loop"));
        looper.stop();
        assert!(!looper.is_running());
    }
}
