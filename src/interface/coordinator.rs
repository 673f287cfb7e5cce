//! Job coordination between worker threads and the coordinator thread.
//!
//! The host only lets one thread start asynchronous operations, and it
//! delivers their completions on that same thread. Workers that need a
//! blocking answer wrap the work in a [`Job`], hand it to [`Coordinator::run_job`]
//! and sleep on a wait slot private to that call. The coordinator thread runs
//! the job, which chains host callbacks as needed and eventually calls
//! [`JobEntry::finish`] exactly once, waking only its own worker.
//!
//! Host implementations deliver completions through [`Coordinator::post`], so
//! completion callbacks execute on the coordinator thread too.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};

use super::errnos::Errno;

/// Unit of work executed on the coordinator thread.
pub trait Job: Send {
    fn run(self: Box<Self>, entry: JobEntry);
}

impl<F> Job for F
where
    F: FnOnce(JobEntry) + Send,
{
    fn run(self: Box<Self>, entry: JobEntry) {
        (*self)(entry)
    }
}

#[derive(Default)]
struct ResultSlot {
    result: Mutex<Option<i32>>,
    done: Condvar,
}

/// Correlates one job with the worker waiting on it.
///
/// `finish` consumes the entry, so a job can only report once. An entry that
/// is dropped unfinished reports `-EIO` so its worker never sleeps forever.
pub struct JobEntry {
    id: u64,
    slot: Option<Arc<ResultSlot>>,
    finished: bool,
}

impl JobEntry {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stores `result` and wakes the worker blocked on this job.
    pub fn finish(mut self, result: i32) {
        self.complete(result);
    }

    fn complete(&mut self, result: i32) {
        self.finished = true;
        if let Some(slot) = self.slot.take() {
            *slot.result.lock() = Some(result);
            slot.done.notify_all();
        }
    }
}

impl Drop for JobEntry {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("job {} dropped without finishing", self.id);
            self.complete(Errno::EIO.as_retval());
        }
    }
}

enum Task {
    Job(Box<dyn Job>, JobEntry),
    Callback(Box<dyn FnOnce() + Send>),
}

struct QueueState {
    tasks: VecDeque<Task>,
    shutdown: bool,
}

struct CoordinatorInner {
    queue: Mutex<QueueState>,
    wake: Condvar,
    owner: Mutex<Option<ThreadId>>,
    next_id: AtomicU64,
}

/// Cloneable handle to one job queue and its coordinator thread.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Coordinator {
            inner: Arc::new(CoordinatorInner {
                queue: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    shutdown: false,
                }),
                wake: Condvar::new(),
                owner: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn new_entry(&self, slot: Option<Arc<ResultSlot>>) -> JobEntry {
        JobEntry {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            slot,
            finished: false,
        }
    }

    // False once shut down. The task is dropped then, which fails any
    // attached entry with EIO.
    fn enqueue(&self, task: Task) -> bool {
        let mut queue = self.inner.queue.lock();
        if queue.shutdown {
            drop(queue);
            log::warn!("coordinator is shut down, discarding task");
            return false;
        }
        queue.tasks.push_back(task);
        drop(queue);
        self.inner.wake.notify_one();
        true
    }

    /// Runs `job` on the coordinator thread and blocks until it finishes,
    /// returning the job's result code.
    ///
    /// Calling this from the coordinator thread would wait on work that can
    /// never run, so it fails immediately with `-EDEADLK` instead.
    pub fn run_job(&self, job: Box<dyn Job>) -> i32 {
        if self.is_coordinator_thread() {
            log::warn!("run_job called on the coordinator thread");
            return Errno::EDEADLK.as_retval();
        }
        let slot = Arc::new(ResultSlot::default());
        let entry = self.new_entry(Some(slot.clone()));
        log::trace!("queueing job {}", entry.id);
        self.enqueue(Task::Job(job, entry));

        let mut result = slot.result.lock();
        loop {
            if let Some(r) = *result {
                return r;
            }
            slot.done.wait(&mut result);
        }
    }

    /// Queues `job` without waiting for it. Its result is discarded.
    ///
    /// Returns false if the coordinator is shut down, in which case the job
    /// has already been dropped without running. A job queued before
    /// `shutdown` but never reached is dropped the same way, so callers that
    /// must learn about it keep a guard inside the job.
    pub fn submit(&self, job: Box<dyn Job>) -> bool {
        let entry = self.new_entry(None);
        self.enqueue(Task::Job(job, entry))
    }

    /// Queues a plain callback, typically a host completion. Returns false
    /// if the callback was dropped because the coordinator is shut down.
    pub fn post<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Task::Callback(Box::new(callback)))
    }

    pub fn is_coordinator_thread(&self) -> bool {
        *self.inner.owner.lock() == Some(thread::current().id())
    }

    // The first thread to pump the queue owns it for good. Any other thread
    // is refused, so `is_coordinator_thread` keeps meaning one thread.
    fn claim(&self) -> bool {
        let me = thread::current().id();
        let mut owner = self.inner.owner.lock();
        match *owner {
            Some(id) if id != me => {
                log::warn!("coordinator queue is already pumped by {:?}", id);
                false
            }
            _ => {
                *owner = Some(me);
                true
            }
        }
    }

    fn execute(&self, task: Task) {
        match task {
            Task::Job(job, entry) => {
                log::trace!("running job {}", entry.id);
                job.run(entry);
            }
            Task::Callback(callback) => callback(),
        }
    }

    /// Runs one queued task on the calling thread, which becomes the
    /// coordinator thread. Returns false when the queue was empty or another
    /// thread already pumps it.
    pub fn do_work(&self) -> bool {
        if !self.claim() {
            return false;
        }
        let task = self.inner.queue.lock().tasks.pop_front();
        match task {
            Some(task) => {
                self.execute(task);
                true
            }
            None => false,
        }
    }

    /// Blocks until a task is available and runs it. Returns false once the
    /// coordinator has been shut down, or at once if another thread already
    /// pumps the queue.
    pub fn wait_and_do_work(&self) -> bool {
        if !self.claim() {
            return false;
        }
        let task = {
            let mut queue = self.inner.queue.lock();
            loop {
                if queue.shutdown {
                    return false;
                }
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                self.inner.wake.wait(&mut queue);
            }
        };
        self.execute(task);
        true
    }

    /// Coordinator loop; returns after `shutdown`.
    pub fn run(&self) {
        while self.wait_and_do_work() {}
    }

    /// Starts a dedicated coordinator thread.
    pub fn spawn(&self) -> CoordinatorThread {
        let coordinator = self.clone();
        let handle = thread::Builder::new()
            .name("coordinator".into())
            .spawn(move || coordinator.run())
            .ok();
        if handle.is_none() {
            log::warn!("could not spawn coordinator thread");
        }
        CoordinatorThread {
            coordinator: self.clone(),
            handle,
        }
    }

    /// Stops the loop. Tasks still queued are dropped, failing their
    /// waiters with `-EIO`.
    pub fn shutdown(&self) {
        let leftovers = {
            let mut queue = self.inner.queue.lock();
            queue.shutdown = true;
            std::mem::take(&mut queue.tasks)
        };
        self.inner.wake.notify_all();
        drop(leftovers);
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.lock().tasks.len()
    }
}

/// Owns a spawned coordinator thread; shuts it down and joins on drop.
pub struct CoordinatorThread {
    coordinator: Coordinator,
    handle: Option<JoinHandle<()>>,
}

impl CoordinatorThread {
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.coordinator.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CoordinatorThread {
    fn drop(&mut self) {
        self.stop();
    }
}
