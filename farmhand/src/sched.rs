//! Single-threaded deferred-task loop.
//!
//! The orchestrator is cooperative: it never blocks waiting for its next
//! turn, it asks the [`Scheduler`] to call it back. [`RunLoop`] is the
//! production implementation: one thread draining a deadline-ordered
//! queue, the moral equivalent of a UI thread's timer queue.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::info;

use crate::ports::Scheduler;

type Task = Box<dyn FnOnce() + Send>;

struct Entry {
    due: Instant,
    seq: u64,
    task: Task,
}

// Order by due time, then submission order.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

struct Queue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    shutdown: bool,
}

/// Deadline-ordered task loop on a dedicated thread.
pub struct RunLoop {
    queue: Arc<(Mutex<Queue>, Condvar)>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RunLoop {
    pub fn start() -> Arc<Self> {
        let queue = Arc::new((
            Mutex::new(Queue {
                heap: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            Condvar::new(),
        ));

        let worker_queue = queue.clone();
        let handle = thread::Builder::new()
            .name("run-loop".into())
            .spawn(move || Self::drain(worker_queue))
            .expect("failed to spawn run loop");

        Arc::new(Self {
            queue,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn drain(queue: Arc<(Mutex<Queue>, Condvar)>) {
        let (lock, cvar) = &*queue;
        loop {
            let task = {
                let mut q = lock.lock().unwrap();
                loop {
                    if q.shutdown {
                        return;
                    }
                    let now = Instant::now();
                    match q.heap.peek().map(|Reverse(e)| e.due) {
                        None => {
                            q = cvar.wait(q).unwrap();
                        }
                        Some(due) if due <= now => {
                            break q.heap.pop().unwrap().0.task;
                        }
                        Some(due) => {
                            let (guard, _) = cvar.wait_timeout(q, due - now).unwrap();
                            q = guard;
                        }
                    }
                }
            };
            // Run outside the lock so tasks can schedule more tasks.
            task();
        }
    }

    /// Stop accepting work and join the worker. Pending tasks are dropped.
    pub fn shutdown(&self) {
        let (lock, cvar) = &*self.queue;
        lock.lock().unwrap().shutdown = true;
        cvar.notify_all();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("run loop stopped");
    }
}

impl Scheduler for RunLoop {
    fn schedule(&self, delay: Duration, task: Task) {
        let (lock, cvar) = &*self.queue;
        let mut q = lock.lock().unwrap();
        if q.shutdown {
            return;
        }
        let seq = q.next_seq;
        q.next_seq += 1;
        q.heap.push(Reverse(Entry {
            due: Instant::now() + delay,
            seq,
            task,
        }));
        cvar.notify_all();
    }
}

impl Drop for RunLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
