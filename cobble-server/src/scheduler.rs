use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::debug;

/// Pause between scheduler cycles.
const TICK_SLEEP: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to add an already existing task <{0}>!")]
    DuplicateTask(String),
    #[error("Failed to remove a non-existent task <{0}>!")]
    UnknownTask(String),
}

/// What a task callback tells the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    /// Remove the task.
    Done,
    /// Re-arm the delay from now.
    Wait,
    /// Run again next cycle, skipping the delay gate.
    Cont,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Waiting,
    Running,
}

type TaskCallback = Box<dyn FnMut() -> TaskResult + Send>;

struct Task {
    priority: i32,
    delay: Duration,
    last_run: Instant,
    gate_delay: bool,
    state: TaskState,
    callback: TaskCallback,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("priority", &self.priority)
            .field("delay", &self.delay)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct SchedulerShared {
    tasks: HashMap<String, Task>,
    shutdown: bool,
}

/// Clonable handle for adding and removing tasks from any thread.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    shared: Arc<Mutex<SchedulerShared>>,
}

impl SchedulerHandle {
    pub fn has_task(&self, name: &str) -> bool {
        self.shared.lock().unwrap().tasks.contains_key(name)
    }

    /// Registers a callback. Task names are unique; reusing one is a hard
    /// error, not a replace.
    pub fn add_task(
        &self,
        name: impl Into<String>,
        priority: i32,
        delay: Duration,
        callback: impl FnMut() -> TaskResult + Send + 'static,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        let mut shared = self.shared.lock().unwrap();
        if shared.tasks.contains_key(&name) {
            return Err(SchedulerError::DuplicateTask(name));
        }
        shared.tasks.insert(
            name,
            Task {
                priority,
                delay,
                last_run: Instant::now(),
                gate_delay: true,
                state: TaskState::Waiting,
                callback: Box::new(callback),
            },
        );
        Ok(())
    }

    pub fn remove_task(&self, name: &str) -> Result<(), SchedulerError> {
        self.shared
            .lock()
            .unwrap()
            .tasks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::UnknownTask(name.to_owned()))
    }

    pub fn shutdown(&self) {
        self.shared.lock().unwrap().shutdown = true;
    }
}

/// Cooperative scheduler: a worker loop that runs waiting tasks in priority
/// order, gated by their delay, every ~10 ms.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    shared: Arc<Mutex<SchedulerShared>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: self.shared.clone(),
        }
    }

    /// One scheduler cycle. Ready candidates are drawn through a min-heap on
    /// priority; each task is taken out of the table while its callback runs
    /// so callbacks may add or remove tasks themselves.
    pub fn tick(&self) {
        let now = Instant::now();

        let mut ready: BinaryHeap<Reverse<(i32, String)>> = {
            let shared = self.shared.lock().unwrap();
            shared
                .tasks
                .iter()
                .filter(|(_, task)| task.state == TaskState::Waiting)
                .map(|(name, task)| Reverse((task.priority, name.clone())))
                .collect()
        };

        while let Some(Reverse((_, name))) = ready.pop() {
            let mut task = {
                let mut shared = self.shared.lock().unwrap();
                if shared.shutdown {
                    return;
                }
                // a previous callback this cycle may have removed it
                let Some(task) = shared.tasks.remove(&name) else {
                    continue;
                };
                task
            };

            if task.gate_delay && now.duration_since(task.last_run) < task.delay {
                self.shared.lock().unwrap().tasks.insert(name, task);
                continue;
            }

            task.state = TaskState::Running;
            let result = (task.callback)();
            task.state = TaskState::Waiting;

            match result {
                TaskResult::Done => {
                    debug!("Task <{}> finished", name);
                    continue;
                }
                TaskResult::Wait => {
                    task.gate_delay = true;
                    task.last_run = Instant::now();
                }
                TaskResult::Cont => {
                    task.gate_delay = false;
                }
            }

            let mut shared = self.shared.lock().unwrap();
            if shared.shutdown {
                return;
            }
            shared.tasks.insert(name, task);
        }
    }

    /// Runs the scheduler on its own worker thread until shutdown, then
    /// drains the task table without running anything further.
    pub fn spawn(self) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            loop {
                if self.shared.lock().unwrap().shutdown {
                    break;
                }
                self.tick();
                std::thread::sleep(TICK_SLEEP);
            }
            self.shared.lock().unwrap().tasks.clear();
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn duplicate_names_are_a_hard_error() -> Result<(), SchedulerError> {
        let scheduler = TaskScheduler::new();
        let handle = scheduler.handle();
        handle.add_task("heartbeat", 0, Duration::ZERO, || TaskResult::Wait)?;
        assert!(matches!(
            handle.add_task("heartbeat", 0, Duration::ZERO, || TaskResult::Wait),
            Err(SchedulerError::DuplicateTask(..))
        ));
        assert!(handle.has_task("heartbeat"));
        Ok(())
    }

    #[test]
    fn done_removes_the_task() -> Result<(), SchedulerError> {
        let scheduler = TaskScheduler::new();
        let handle = scheduler.handle();
        let runs = Arc::new(AtomicUsize::new(0));
        handle.add_task("once", 0, Duration::ZERO, {
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                TaskResult::Done
            }
        })?;

        scheduler.tick();
        scheduler.tick();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!handle.has_task("once"));
        Ok(())
    }

    #[test]
    fn cont_skips_the_delay_gate_wait_rearms_it() -> Result<(), SchedulerError> {
        let scheduler = TaskScheduler::new();
        let handle = scheduler.handle();
        let delay = Duration::from_millis(200);

        let cont_runs = Arc::new(AtomicUsize::new(0));
        let wait_runs = Arc::new(AtomicUsize::new(0));
        handle.add_task("every-tick", 0, delay, {
            let runs = cont_runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                TaskResult::Cont
            }
        })?;
        handle.add_task("delayed", 0, delay, {
            let runs = wait_runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                TaskResult::Wait
            }
        })?;

        // both are gated until their delay first elapses
        scheduler.tick();
        assert_eq!(cont_runs.load(Ordering::SeqCst), 0);
        assert_eq!(wait_runs.load(Ordering::SeqCst), 0);

        std::thread::sleep(delay + Duration::from_millis(50));
        scheduler.tick();
        // Cont dropped its gate, Wait re-armed its delay
        scheduler.tick();
        scheduler.tick();

        assert_eq!(cont_runs.load(Ordering::SeqCst), 3);
        assert_eq!(wait_runs.load(Ordering::SeqCst), 1);
        assert!(handle.has_task("delayed"));
        Ok(())
    }

    #[test]
    fn tasks_run_in_priority_order() -> Result<(), SchedulerError> {
        let scheduler = TaskScheduler::new();
        let handle = scheduler.handle();

        let order = Arc::new(Mutex::new(Vec::new()));
        for (name, priority) in [("low", 10), ("high", -5), ("mid", 3)] {
            handle.add_task(name, priority, Duration::ZERO, {
                let order = order.clone();
                move || {
                    order.lock().unwrap().push(name);
                    TaskResult::Done
                }
            })?;
        }

        scheduler.tick();
        assert_eq!(*order.lock().unwrap(), vec!["high", "mid", "low"]);
        Ok(())
    }

    #[test]
    fn callbacks_may_touch_the_scheduler() -> Result<(), SchedulerError> {
        let scheduler = TaskScheduler::new();
        let handle = scheduler.handle();

        handle.add_task("spawner", 0, Duration::ZERO, {
            let handle = handle.clone();
            move || {
                handle
                    .add_task("spawned", 0, Duration::from_secs(3600), || TaskResult::Wait)
                    .unwrap();
                TaskResult::Done
            }
        })?;

        scheduler.tick();
        assert!(handle.has_task("spawned"));
        assert!(!handle.has_task("spawner"));
        Ok(())
    }

    #[test]
    fn shutdown_drains_without_running() -> Result<(), SchedulerError> {
        let scheduler = TaskScheduler::new();
        let handle = scheduler.handle();
        let runs = Arc::new(AtomicUsize::new(0));
        handle.add_task("never", 0, Duration::ZERO, {
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                TaskResult::Wait
            }
        })?;

        handle.shutdown();
        let worker = scheduler.spawn();
        worker.join().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!handle.has_task("never"));
        Ok(())
    }
}
