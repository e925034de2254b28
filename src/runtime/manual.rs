use super::scheduler::{Scheduler, Task, TimerHandle};
use std::sync::Mutex;
use std::time::Duration;

struct Entry {
    due: Duration,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    seq: u64,
    queue: Vec<Entry>,
}

/// Scheduler driven by an explicit virtual clock.
///
/// Nothing runs until [`advance`](Self::advance) moves time past a task's
/// due point. Suited to tests and to hosts with their own cooperative loop.
///
/// # Examples
///
/// ```
/// use statebox::runtime::{ManualScheduler, Scheduler};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let hits_clone = hits.clone();
///
/// scheduler.schedule(Duration::from_millis(10), Box::new(move || {
///     hits_clone.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// scheduler.advance(Duration::from_millis(9));
/// assert_eq!(hits.load(Ordering::SeqCst), 0);
/// scheduler.advance(Duration::from_millis(1));
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<Clock>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        super::lock(&self.clock).now
    }

    /// Number of armed tasks that have not been cancelled or run.
    pub fn pending(&self) -> usize {
        super::lock(&self.clock)
            .queue
            .iter()
            .filter(|entry| !entry.handle.is_cancelled())
            .count()
    }

    /// Move the clock forward, running every task that falls due in order.
    ///
    /// Tasks scheduled by running tasks are honoured if they fall due within
    /// the same window.
    pub fn advance(&self, by: Duration) {
        let target = super::lock(&self.clock).now + by;

        loop {
            let next = {
                let mut clock = super::lock(&self.clock);
                clock.queue.retain(|entry| !entry.handle.is_cancelled());

                let position = clock
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.due <= target)
                    .min_by_key(|(_, entry)| (entry.due, entry.seq))
                    .map(|(index, _)| index);

                match position {
                    Some(index) => {
                        let entry = clock.queue.swap_remove(index);
                        clock.now = clock.now.max(entry.due);
                        Some(entry)
                    }
                    None => {
                        clock.now = target;
                        None
                    }
                }
            };

            // Run outside the lock so the task can schedule more work.
            match next {
                Some(entry) if !entry.handle.is_cancelled() => (entry.task)(),
                Some(_) => {}
                None => break,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut clock = super::lock(&self.clock);
        let due = clock.now + delay;
        clock.seq += 1;
        let seq = clock.seq;
        clock.queue.push(Entry {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    fn recorder() -> (Arc<StdMutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &'static str| -> Task {
            let log = log_clone.clone();
            Box::new(move || log.lock().unwrap().push(name))
        };
        (log, make)
    }

    #[test]
    fn runs_in_due_order() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        scheduler.schedule(Duration::from_millis(30), task("late"));
        scheduler.schedule(Duration::from_millis(10), task("early"));
        scheduler.schedule(Duration::from_millis(10), task("early-second"));

        scheduler.advance(Duration::from_millis(100));
        assert_eq!(*log.lock().unwrap(), vec!["early", "early-second", "late"]);
        assert_eq!(scheduler.now(), Duration::from_millis(100));
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        let handle = scheduler.schedule(Duration::from_millis(5), task("cancelled"));
        scheduler.schedule(Duration::from_millis(5), task("kept"));
        assert_eq!(scheduler.pending(), 2);

        handle.cancel();
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_millis(5));
        assert_eq!(*log.lock().unwrap(), vec!["kept"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn tasks_can_schedule_more_work() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (log, task) = recorder();
        let inner = scheduler.clone();
        let follow_up = task("follow-up");

        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                inner.schedule(Duration::from_millis(5), follow_up);
            }),
        );

        scheduler.advance(Duration::from_millis(8));
        assert!(log.lock().unwrap().is_empty());
        scheduler.advance(Duration::from_millis(2));
        assert_eq!(*log.lock().unwrap(), vec!["follow-up"]);
    }
}
