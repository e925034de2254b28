use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Arms delayed tasks that can be cancelled before they run.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed, unless the returned handle is
    /// cancelled first.
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation handle for a scheduled task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prevent the task from running. Has no effect once it has started.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct Entry {
    due: Instant,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

#[derive(Default)]
struct Queue {
    seq: u64,
    entries: Vec<Entry>,
    worker: bool,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
}

/// Scheduler backed by a single background worker thread.
///
/// The worker sleeps until the earliest armed deadline and runs tasks in
/// deadline order. Cancelled tasks are dropped from the queue instead of
/// being waited on. The worker starts on the first [`schedule`] call and
/// stops when the scheduler is dropped; tasks still pending then never run.
///
/// [`schedule`]: Scheduler::schedule
///
/// # Examples
///
/// ```
/// use statebox::runtime::{Scheduler, ThreadScheduler};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = ThreadScheduler::new();
/// let ran = Arc::new(AtomicBool::new(false));
/// let flag = ran.clone();
/// let handle = scheduler.schedule(
///     Duration::from_millis(50),
///     Box::new(move || flag.store(true, Ordering::SeqCst)),
/// );
/// handle.cancel();
/// assert_eq!(scheduler.pending(), 0);
///
/// std::thread::sleep(Duration::from_millis(100));
/// assert!(!ran.load(Ordering::SeqCst));
/// ```
#[derive(Default)]
pub struct ThreadScheduler {
    shared: Arc<Shared>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared instance used by stores built without an explicit scheduler.
    pub fn global() -> Arc<dyn Scheduler> {
        static SCHEDULER: OnceLock<Arc<dyn Scheduler>> = OnceLock::new();
        Arc::clone(SCHEDULER.get_or_init(|| Arc::new(ThreadScheduler::new()) as Arc<dyn Scheduler>))
    }

    /// Number of armed tasks that have not been cancelled or run.
    pub fn pending(&self) -> usize {
        super::lock(&self.shared.queue)
            .entries
            .iter()
            .filter(|entry| !entry.handle.is_cancelled())
            .count()
    }

    fn start_worker(&self, queue: &mut Queue) {
        if queue.worker {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("statebox-timer".into())
            .spawn(move || run(&shared));

        match spawned {
            Ok(_) => queue.worker = true,
            // The task stays queued; the next schedule call retries.
            Err(err) => tracing::error!(error = %err, "failed to start timer thread"),
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();

        let mut queue = super::lock(&self.shared.queue);
        queue.entries.retain(|entry| !entry.handle.is_cancelled());

        let seq = queue.seq;
        queue.seq += 1;
        queue.entries.push(Entry {
            due: Instant::now() + delay,
            seq,
            handle: handle.clone(),
            task,
        });

        self.start_worker(&mut queue);
        drop(queue);
        self.shared.wake.notify_one();

        handle
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        super::lock(&self.shared.queue).shutdown = true;
        self.shared.wake.notify_one();
    }
}

fn run(shared: &Shared) {
    let mut queue = super::lock(&shared.queue);

    loop {
        if queue.shutdown {
            return;
        }
        queue.entries.retain(|entry| !entry.handle.is_cancelled());

        let next = queue
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| (entry.due, entry.seq))
            .map(|(index, entry)| (index, entry.due));

        let now = Instant::now();
        match next {
            None => {
                queue = shared.wake.wait(queue).unwrap_or_else(PoisonError::into_inner);
            }
            Some((_, due)) if due > now => {
                queue = shared
                    .wake
                    .wait_timeout(queue, due - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            Some((index, _)) => {
                let entry = queue.entries.swap_remove(index);
                drop(queue);

                if !entry.handle.is_cancelled() {
                    let task = entry.task;
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::error!("scheduled task panicked");
                    }
                }

                queue = super::lock(&shared.queue);
            }
        }
    }
}
