use parking_lot::Mutex;
use std::sync::Arc;

/// Background phase. Runs once on a worker thread.
pub(crate) type StartFn = Box<dyn FnOnce() + Send + 'static>;
/// Non-blocking readiness predicate. Runs on the owner thread.
pub(crate) type PollFn = Box<dyn FnMut() -> bool + 'static>;
/// Finalize phase. Runs once on the owner thread.
pub(crate) type FinalizeFn = Box<dyn FnOnce() + 'static>;

/// Identifier of a registered task, unique within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Where a task is in its lifecycle.
///
/// `Unstarted -> Running -> ReadyForFinalize -> Finalized`. A finalized task has
/// already left the scheduler, so it is only ever observed in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskPhase {
    /// Registered, background phase not launched yet.
    Unstarted,
    /// Worker thread launched; polled every tick.
    Running,
    /// `poll_ready` returned true; finalize runs within the same tick.
    ReadyForFinalize,
    Finalized,
}

/// One in-flight asynchronous load.
pub struct PendingTask {
    id: TaskId,
    label: String,
    phase: TaskPhase,
    // Kept behind a shared slot so a failed spawn leaves the closure here for a retry.
    start: Arc<Mutex<Option<StartFn>>>,
    poll_ready: PollFn,
    finalize: Option<FinalizeFn>,
}

impl PendingTask {
    pub(crate) fn new(
        id: TaskId,
        label: String,
        start: StartFn,
        poll_ready: PollFn,
        finalize: FinalizeFn,
    ) -> Self {
        Self {
            id,
            label,
            phase: TaskPhase::Unstarted,
            start: Arc::new(Mutex::new(Some(start))),
            poll_ready,
            finalize: Some(finalize),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    /// Launch the background phase on a new detached thread.
    ///
    /// On error the task stays `Unstarted` and keeps its `start` closure.
    pub(crate) fn launch(&mut self) -> std::io::Result<()> {
        debug_assert_eq!(self.phase, TaskPhase::Unstarted);
        let slot = Arc::clone(&self.start);
        std::thread::Builder::new()
            .name(format!("load-{}", self.id.0))
            .spawn(move || {
                let start = slot.lock().take();
                if let Some(start) = start {
                    start();
                }
            })?;
        self.phase = TaskPhase::Running;
        Ok(())
    }

    /// Ask a running task whether its background phase is done.
    pub(crate) fn poll(&mut self) -> bool {
        if self.phase != TaskPhase::Running {
            return false;
        }
        if (self.poll_ready)() {
            self.phase = TaskPhase::ReadyForFinalize;
            true
        } else {
            false
        }
    }

    /// Run the finalize phase, consuming the task.
    pub(crate) fn finalize(mut self) {
        debug_assert_eq!(self.phase, TaskPhase::ReadyForFinalize);
        if let Some(finalize) = self.finalize.take() {
            finalize();
        }
        self.phase = TaskPhase::Finalized;
        tracing::debug!(task = %self.id, label = %self.label, "task finalized");
    }
}

impl std::fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTask")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    fn wait_for(flag: &AtomicBool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !flag.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "background phase never ran");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn unstarted_task_is_never_polled() {
        let polled = Rc::new(Cell::new(false));
        let seen = polled.clone();
        let mut task = PendingTask::new(
            TaskId(1),
            "idle".into(),
            Box::new(|| {}),
            Box::new(move || {
                seen.set(true);
                true
            }),
            Box::new(|| {}),
        );
        assert!(!task.poll());
        assert!(!polled.get());
        assert_eq!(task.phase(), TaskPhase::Unstarted);
    }

    #[test]
    fn launch_runs_start_on_another_thread() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let caller = std::thread::current().id();
        let off_thread = Arc::new(AtomicBool::new(false));
        let off = off_thread.clone();

        let mut task = PendingTask::new(
            TaskId(7),
            "skybox".into(),
            Box::new(move || {
                off.store(std::thread::current().id() != caller, Ordering::SeqCst);
                flag.store(true, Ordering::SeqCst);
            }),
            Box::new(|| true),
            Box::new(|| {}),
        );
        task.launch().unwrap();
        assert_eq!(task.phase(), TaskPhase::Running);
        wait_for(&ran);
        assert!(off_thread.load(Ordering::SeqCst));
    }

    #[test]
    fn ready_task_finalizes_once() {
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let mut task = PendingTask::new(
            TaskId(2),
            "font".into(),
            Box::new(|| {}),
            Box::new(|| true),
            Box::new(move || counter.set(counter.get() + 1)),
        );
        task.launch().unwrap();
        assert!(task.poll());
        assert_eq!(task.phase(), TaskPhase::ReadyForFinalize);
        task.finalize();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn task_id_display() {
        assert_eq!(TaskId(12).to_string(), "task#12");
    }
}
