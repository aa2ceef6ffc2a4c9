//! Admission control for acquisition tasks
//!
//! Every task runs on its own OS thread. The gate bounds how many of them run
//! at once, contains failures and panics at the task boundary, and hands each
//! outcome back to the orchestrator when it drains.

use std::any::Any;
use std::fmt::{self, Display};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error};

/// Errors that can occur while launching a task
#[derive(Debug, Error)]
pub enum GateError {
    /// The operating system refused to start a thread
    #[error("Failed to start task {label}: {source}")]
    SpawnFailed {
        label: String,
        source: std::io::Error,
    },
}

/// Identifies a launched task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a task: Pending → Running → (Succeeded | Failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// How a task ended
#[derive(Debug)]
pub enum TaskOutcome<T, E> {
    Succeeded(T),
    Failed(E),
    /// The task panicked; carries the panic message
    Panicked(String),
}

impl<T, E> TaskOutcome<T, E> {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Succeeded(_) => TaskState::Succeeded,
            TaskOutcome::Failed(_) | TaskOutcome::Panicked(_) => TaskState::Failed,
        }
    }
}

/// Outcome of a drained task
#[derive(Debug)]
pub struct TaskReport<T, E> {
    pub id: TaskId,
    pub label: String,
    pub outcome: TaskOutcome<T, E>,
}

impl<T, E> TaskReport<T, E> {
    pub fn state(&self) -> TaskState {
        self.outcome.state()
    }

    pub fn succeeded(&self) -> bool {
        self.state() == TaskState::Succeeded
    }
}

/// Counting semaphore over running tasks
#[derive(Default)]
struct Slots {
    running: Mutex<usize>,
    released: Condvar,
}

impl Slots {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Occupies one running slot until dropped, including during a panic unwind
struct SlotGuard {
    slots: Arc<Slots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut running = self.slots.lock();
        *running = running.saturating_sub(1);
        drop(running);
        self.slots.released.notify_all();
    }
}

struct LaunchedTask<T, E> {
    id: TaskId,
    label: String,
    state: Arc<Mutex<TaskState>>,
    handle: JoinHandle<TaskOutcome<T, E>>,
}

/// Bounds and tracks concurrently running acquisition tasks.
///
/// The registry is only touched by the orchestrating thread; tasks report
/// back solely through their outcome and state cell.
pub struct ConcurrencyGate<T, E> {
    slots: Arc<Slots>,
    tasks: Mutex<Vec<LaunchedTask<T, E>>>,
    next_id: AtomicUsize,
}

impl<T, E> Default for ConcurrencyGate<T, E>
where
    T: Send + 'static,
    E: Display + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> ConcurrencyGate<T, E>
where
    T: Send + 'static,
    E: Display + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Slots::default()),
            tasks: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Number of tasks currently holding a slot
    pub fn running(&self) -> usize {
        *self.slots.lock()
    }

    /// Blocks until fewer than `max_concurrent` tasks are running.
    ///
    /// A limit of zero is treated as one.
    pub fn admit(&self, max_concurrent: usize) {
        let max_concurrent = max_concurrent.max(1);
        let mut running = self.slots.lock();
        while *running >= max_concurrent {
            running = self
                .slots
                .released
                .wait(running)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Starts `task` on its own thread and registers it.
    ///
    /// Does not wait for capacity; call [`admit`](Self::admit) first.
    pub fn launch<F>(&self, label: impl Into<String>, task: F) -> Result<TaskId, GateError>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let label = label.into();
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(Mutex::new(TaskState::Pending));

        *self.slots.lock() += 1;
        let slot = SlotGuard {
            slots: Arc::clone(&self.slots),
        };

        let task_state = Arc::clone(&state);
        let task_label = label.clone();

        let handle = thread::Builder::new()
            .name(format!("acquire-{}", id.0))
            .spawn(move || {
                let _slot = slot;
                set_state(&task_state, TaskState::Running);

                let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
                    Ok(Ok(value)) => {
                        debug!(task = %task_label, "task succeeded");
                        TaskOutcome::Succeeded(value)
                    }
                    Ok(Err(e)) => {
                        error!(task = %task_label, error = %e, "task failed");
                        TaskOutcome::Failed(e)
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(task = %task_label, panic = %message, "task panicked");
                        TaskOutcome::Panicked(message)
                    }
                };

                set_state(&task_state, outcome.state());
                outcome
            })
            .map_err(|source| GateError::SpawnFailed {
                label: label.clone(),
                source,
            })?;

        self.lock_tasks().push(LaunchedTask {
            id,
            label,
            state,
            handle,
        });

        Ok(id)
    }

    /// Current state of a registered task, `None` once drained
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.lock_tasks()
            .iter()
            .find(|task| task.id == id)
            .map(|task| *task.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Waits for every registered task and returns their reports in launch order.
    pub fn drain(&self) -> Vec<TaskReport<T, E>> {
        let launched = std::mem::take(&mut *self.lock_tasks());

        launched
            .into_iter()
            .map(|task| {
                let outcome = task.handle.join().unwrap_or_else(|payload| {
                    TaskOutcome::Panicked(panic_message(payload.as_ref()))
                });
                TaskReport {
                    id: task.id,
                    label: task.label,
                    outcome,
                }
            })
            .collect()
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<LaunchedTask<T, E>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_state(cell: &Mutex<TaskState>, state: TaskState) {
    *cell.lock().unwrap_or_else(PoisonError::into_inner) = state;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
