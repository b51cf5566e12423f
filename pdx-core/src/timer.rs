//! A background thread that runs tasks after a delay.

use crate::error::Result;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Handle to a scheduled task.
pub type TimerId = u64;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    deadline: Instant,
    task: Task,
}

#[derive(Default)]
struct State {
    // Entries whose deadline no longer matches `tasks` are stale and skipped.
    queue: BinaryHeap<Reverse<(Instant, TimerId)>>,
    tasks: HashMap<TimerId, Scheduled>,
    next_id: TimerId,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
}

/// Deadline-ordered task queue served by one dedicated thread.
///
/// Tasks run on the timer thread, never on the caller's. A task that panics
/// is logged and the thread keeps serving the queue. Dropping the queue
/// discards pending tasks and joins the thread.
pub struct TimerQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl TimerQueue {
    /// Starts the timer thread.
    pub fn new(name: &str) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || run(&shared))?
        };
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Runs `task` once `delay` has elapsed.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let mut state = self.shared.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.tasks.insert(
            id,
            Scheduled {
                deadline,
                task: Box::new(task),
            },
        );
        state.queue.push(Reverse((deadline, id)));
        drop(state);
        self.shared.wakeup.notify_one();
        id
    }

    /// Moves a pending task's deadline to `delay` from now.
    ///
    /// Returns `false` if the task already ran or was cancelled.
    pub fn reschedule(&self, id: TimerId, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut state = self.shared.state.lock();
        match state.tasks.get_mut(&id) {
            Some(scheduled) => {
                scheduled.deadline = deadline;
                state.queue.push(Reverse((deadline, id)));
                drop(state);
                self.shared.wakeup.notify_one();
                true
            }
            None => false,
        }
    }

    /// Removes a pending task. Returns `false` if it already ran.
    pub fn cancel(&self, id: TimerId) -> bool {
        self.shared.state.lock().tasks.remove(&id).is_some()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for TimerQueue {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wakeup.notify_all();
        if let Some(worker) = self.worker.take() {
            // The last owner may be dropped by a task on the timer thread itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let next = state.queue.peek().map(|Reverse(entry)| *entry);
        let Some((deadline, id)) = next else {
            shared.wakeup.wait(&mut state);
            continue;
        };
        if state.tasks.get(&id).map(|s| s.deadline) != Some(deadline) {
            state.queue.pop();
            continue;
        }
        if deadline > Instant::now() {
            shared.wakeup.wait_until(&mut state, deadline);
            continue;
        }
        state.queue.pop();
        if let Some(scheduled) = state.tasks.remove(&id) {
            trace!(id, "running timer task");
            MutexGuard::unlocked(&mut state, || {
                if panic::catch_unwind(AssertUnwindSafe(scheduled.task)).is_err() {
                    warn!(id, "timer task panicked");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn test_task_runs_after_delay() {
        let timer = TimerQueue::new("test-timer").unwrap();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        timer.schedule(Duration::from_millis(30), move || {
            tx.send(Instant::now()).unwrap();
        });
        let ran_at = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(ran_at.duration_since(start) >= Duration::from_millis(30));
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn test_tasks_run_in_deadline_order() {
        let timer = TimerQueue::new("test-timer").unwrap();
        let (tx, rx) = mpsc::channel();
        for (delay, tag) in [(60u64, "late"), (10, "early"), (30, "middle")] {
            let tx = tx.clone();
            timer.schedule(Duration::from_millis(delay), move || {
                tx.send(tag).unwrap();
            });
        }
        let order: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_cancel_prevents_run() {
        let timer = TimerQueue::new("test-timer").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = timer.schedule(Duration::from_millis(20), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.cancel(id));
        assert!(!timer.cancel(id));
        thread::sleep(Duration::from_millis(80));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reschedule_pushes_deadline_back() {
        let timer = TimerQueue::new("test-timer").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = timer.schedule(Duration::from_millis(50), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.reschedule(id, Duration::from_millis(300)));
        thread::sleep(Duration::from_millis(120));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        thread::sleep(Duration::from_millis(400));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!timer.reschedule(id, Duration::from_millis(10)));
    }

    #[test]
    fn test_panicking_task_does_not_stop_thread() {
        let timer = TimerQueue::new("test-timer").unwrap();
        timer.schedule(Duration::from_millis(5), || panic!("boom"));
        let (tx, rx) = mpsc::channel();
        timer.schedule(Duration::from_millis(30), move || tx.send(()).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_drop_discards_pending_tasks() {
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let timer = TimerQueue::new("test-timer").unwrap();
            let h = Arc::clone(&hits);
            timer.schedule(Duration::from_millis(50), move || {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }
        thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
