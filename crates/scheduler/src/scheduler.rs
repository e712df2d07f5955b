use std::cell::{Cell, RefCell};

use sensorview_common::OwnerThread;

use crate::task::{PendingTask, TaskId, TaskPhase};

/// Scheduler configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of background phases running at once. `None` spawns a
    /// worker for every registration immediately.
    pub max_running: Option<usize>,
}

impl SchedulerConfig {
    /// One worker per registration, no cap.
    pub fn unbounded() -> Self {
        Self { max_running: None }
    }

    /// At most `limit` workers at once. A limit of zero is treated as one.
    pub fn bounded(limit: usize) -> Self {
        Self {
            max_running: Some(limit.max(1)),
        }
    }
}

/// Scheduler counters for instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub pending: usize,
    pub running: usize,
    pub finalized_last_tick: usize,
    pub total_registered: u64,
    pub total_finalized: u64,
}

/// Owns the pending tasks and drives them to completion from the render loop.
///
/// All methods take `&self` so a finalize callback can register follow-up
/// work on the same scheduler (share it through `Rc`). The scheduler holds
/// owner-thread closures, so it is neither `Send` nor `Sync`.
///
/// `poll_ready` callbacks run while the pending set is borrowed and must not
/// register work. The counters stay readable from any callback.
pub struct TaskScheduler {
    config: SchedulerConfig,
    owner: OwnerThread,
    tasks: RefCell<Vec<PendingTask>>,
    // Registered and not finalized, including a task whose finalize is running.
    pending: Cell<usize>,
    running: Cell<usize>,
    next_id: Cell<u64>,
    total_finalized: Cell<u64>,
    finalized_last_tick: Cell<usize>,
}

impl TaskScheduler {
    /// Create a scheduler owned by the calling thread.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            owner: OwnerThread::current(),
            tasks: RefCell::new(Vec::new()),
            pending: Cell::new(0),
            running: Cell::new(0),
            next_id: Cell::new(0),
            total_finalized: Cell::new(0),
            finalized_last_tick: Cell::new(0),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Thread that polls and finalizes tasks.
    pub fn owner(&self) -> OwnerThread {
        self.owner
    }

    /// Register a load and launch its background phase.
    ///
    /// `start` runs once on a new detached thread. `poll_ready` is asked once per
    /// tick, on the owner thread, and must not block. `finalize` runs once on the
    /// owner thread after `poll_ready` returned true.
    pub fn add_process<S, F, P>(&self, start: S, finalize: F, poll_ready: P) -> TaskId
    where
        S: FnOnce() + Send + 'static,
        F: FnOnce() + 'static,
        P: FnMut() -> bool + 'static,
    {
        self.register(None, start, finalize, poll_ready)
    }

    /// [`add_process`](Self::add_process) with a label for logs.
    pub fn add_named_process<S, F, P>(
        &self,
        label: impl Into<String>,
        start: S,
        finalize: F,
        poll_ready: P,
    ) -> TaskId
    where
        S: FnOnce() + Send + 'static,
        F: FnOnce() + 'static,
        P: FnMut() -> bool + 'static,
    {
        self.register(Some(label.into()), start, finalize, poll_ready)
    }

    fn register<S, F, P>(&self, label: Option<String>, start: S, finalize: F, poll_ready: P) -> TaskId
    where
        S: FnOnce() + Send + 'static,
        F: FnOnce() + 'static,
        P: FnMut() -> bool + 'static,
    {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let label = label.unwrap_or_else(|| format!("task-{}", id.0));

        let mut task = PendingTask::new(
            id,
            label,
            Box::new(start),
            Box::new(poll_ready),
            Box::new(finalize),
        );

        let mut tasks = self.tasks.borrow_mut();
        if self.has_capacity(self.running.get()) {
            match task.launch() {
                Ok(()) => self.running.set(self.running.get() + 1),
                Err(e) => {
                    tracing::warn!(task = %id, "failed to spawn load worker, retrying next tick: {e}")
                }
            }
        }
        tracing::info!(
            task = %id,
            label = %task.label(),
            phase = ?task.phase(),
            "registered load task"
        );
        tasks.push(task);
        self.pending.set(self.pending.get() + 1);
        id
    }

    /// Poll every pending task once and finalize the ready ones.
    ///
    /// Call once per render-loop iteration from the owner thread. Tasks are
    /// polled in registration order; a ready task is finalized immediately, and
    /// several tasks may finalize in one call. Returns how many finalized.
    pub fn tick(&self) -> usize {
        self.owner.debug_assert_current();
        let _span = tracing::trace_span!("scheduler_tick").entered();

        self.launch_waiting();

        let mut finalized = 0;
        let mut index = 0;
        loop {
            let ready = {
                let mut tasks = self.tasks.borrow_mut();
                if index >= tasks.len() {
                    break;
                }
                if tasks[index].poll() {
                    self.running.set(self.running.get() - 1);
                    Some(tasks.remove(index))
                } else {
                    index += 1;
                    None
                }
            };

            // The pending set is not borrowed here, so finalize may register more tasks.
            if let Some(task) = ready {
                task.finalize();
                self.pending.set(self.pending.get() - 1);
                finalized += 1;
                self.total_finalized.set(self.total_finalized.get() + 1);
                self.launch_waiting();
            }
        }

        self.finalized_last_tick.set(finalized);
        if finalized > 0 {
            tracing::debug!(finalized, pending = self.pending(), "scheduler tick");
        }
        finalized
    }

    /// True iff no task is pending.
    ///
    /// A task counts as pending until its finalize has returned, so this is
    /// still false inside the last task's finalize.
    pub fn finished(&self) -> bool {
        self.pending.get() == 0
    }

    /// Number of tasks not finalized yet, including ones waiting for a worker
    /// and one whose finalize is running.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Number of tasks whose background phase is launched and not yet reported
    /// ready.
    pub fn running(&self) -> usize {
        self.running.get()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            pending: self.pending(),
            running: self.running(),
            finalized_last_tick: self.finalized_last_tick.get(),
            total_registered: self.next_id.get(),
            total_finalized: self.total_finalized.get(),
        }
    }

    fn has_capacity(&self, running: usize) -> bool {
        self.config.max_running.is_none_or(|limit| running < limit)
    }

    /// Launch unstarted tasks in registration order while capacity allows.
    fn launch_waiting(&self) {
        let mut tasks = self.tasks.borrow_mut();
        for task in tasks.iter_mut() {
            if task.phase() != TaskPhase::Unstarted {
                continue;
            }
            if !self.has_capacity(self.running.get()) {
                break;
            }
            match task.launch() {
                Ok(()) => {
                    self.running.set(self.running.get() + 1);
                    tracing::debug!(task = %task.id(), "launched waiting task");
                }
                Err(e) => {
                    tracing::warn!(task = %task.id(), "failed to spawn load worker: {e}");
                    break;
                }
            }
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Tick until the scheduler is empty. Returns the number of ticks taken.
    fn drain(scheduler: &TaskScheduler) -> usize {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut ticks = 0;
        while !scheduler.finished() {
            assert!(Instant::now() < deadline, "scheduler never finished");
            scheduler.tick();
            ticks += 1;
            std::thread::sleep(Duration::from_millis(2));
        }
        ticks
    }

    fn wait_until(flag: &AtomicBool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !flag.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "background phase never ran");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn empty_scheduler_is_finished() {
        let scheduler = TaskScheduler::default();
        assert!(scheduler.finished());
        assert_eq!(scheduler.tick(), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn adding_a_task_clears_finished_immediately() {
        let scheduler = TaskScheduler::default();
        let gate = Rc::new(Cell::new(false));
        let poll_gate = gate.clone();
        scheduler.add_process(|| {}, || {}, move || poll_gate.get());

        assert!(!scheduler.finished());
        scheduler.tick();
        assert!(!scheduler.finished());

        gate.set(true);
        scheduler.tick();
        assert!(scheduler.finished());
    }

    #[test]
    fn slow_load_finalizes_on_a_later_tick() {
        let scheduler = TaskScheduler::default();
        let decoded = Arc::new(AtomicBool::new(false));
        let worker_flag = decoded.clone();
        let poll_flag = decoded.clone();

        let finalize_count = Rc::new(Cell::new(0));
        let finalize_tick = Rc::new(Cell::new(None));
        let finalize_thread = Rc::new(Cell::new(None));
        let tick_number = Rc::new(Cell::new(0usize));

        let (count, at_tick, on_thread, now) = (
            finalize_count.clone(),
            finalize_tick.clone(),
            finalize_thread.clone(),
            tick_number.clone(),
        );
        scheduler.add_named_process(
            "slow",
            move || {
                std::thread::sleep(Duration::from_millis(50));
                worker_flag.store(true, Ordering::SeqCst);
            },
            move || {
                count.set(count.get() + 1);
                at_tick.set(Some(now.get()));
                on_thread.set(Some(std::thread::current().id()));
            },
            move || poll_flag.load(Ordering::SeqCst),
        );

        // Tick 0: the worker is still sleeping.
        assert_eq!(scheduler.tick(), 0);
        assert!(!scheduler.finished());
        assert_eq!(finalize_count.get(), 0);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !scheduler.finished() {
            assert!(Instant::now() < deadline);
            tick_number.set(tick_number.get() + 1);
            let finalized = scheduler.tick();
            // finished() flips exactly when the finalize ran.
            assert_eq!(scheduler.finished(), finalized == 1);
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(finalize_count.get(), 1);
        assert!(finalize_tick.get().unwrap() > 0);
        assert_eq!(finalize_thread.get(), Some(std::thread::current().id()));

        for _ in 0..3 {
            scheduler.tick();
        }
        assert_eq!(finalize_count.get(), 1);
    }

    #[test]
    fn finalize_waits_for_poll_ready() {
        let scheduler = TaskScheduler::default();
        let gate = Rc::new(Cell::new(false));
        let polls = Rc::new(Cell::new(0));
        let finalized = Rc::new(Cell::new(false));

        let (poll_gate, poll_count, done) = (gate.clone(), polls.clone(), finalized.clone());
        scheduler.add_process(
            || {},
            move || done.set(true),
            move || {
                poll_count.set(poll_count.get() + 1);
                poll_gate.get()
            },
        );

        for _ in 0..4 {
            scheduler.tick();
        }
        assert!(!finalized.get());
        assert_eq!(polls.get(), 4);

        gate.set(true);
        assert_eq!(scheduler.tick(), 1);
        assert!(finalized.get());
        assert_eq!(polls.get(), 5);
    }

    #[test]
    fn ready_tasks_finalize_in_one_tick_in_registration_order() {
        let scheduler = TaskScheduler::default();
        let order = Rc::new(RefCell::new(Vec::new()));
        let first_done = Arc::new(AtomicBool::new(false));
        let second_done = Arc::new(AtomicBool::new(false));

        for (name, flag) in [("first", first_done.clone()), ("second", second_done.clone())] {
            let worker_flag = flag.clone();
            let log = order.clone();
            scheduler.add_named_process(
                name,
                move || worker_flag.store(true, Ordering::SeqCst),
                move || log.borrow_mut().push(name),
                move || flag.load(Ordering::SeqCst),
            );
        }

        wait_until(&first_done);
        wait_until(&second_done);

        assert_eq!(scheduler.tick(), 2);
        assert_eq!(*order.borrow(), vec!["first", "second"]);
        assert!(scheduler.finished());
        assert_eq!(scheduler.stats().finalized_last_tick, 2);
    }

    #[test]
    fn not_ready_task_does_not_hold_back_later_ones() {
        let scheduler = TaskScheduler::default();
        let order = Rc::new(RefCell::new(Vec::new()));

        let log = order.clone();
        scheduler.add_process(|| {}, move || log.borrow_mut().push("stuck"), || false);
        let log = order.clone();
        scheduler.add_process(|| {}, move || log.borrow_mut().push("quick"), || true);

        assert_eq!(scheduler.tick(), 1);
        assert_eq!(*order.borrow(), vec!["quick"]);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn finalize_can_register_follow_up_work() {
        let scheduler = Rc::new(TaskScheduler::default());
        let follow_up_done = Rc::new(Cell::new(false));

        let chained = scheduler.clone();
        let done = follow_up_done.clone();
        scheduler.add_named_process(
            "skybox",
            || {},
            move || {
                let done = done.clone();
                chained.add_named_process("irradiance", || {}, move || done.set(true), || true);
            },
            || true,
        );

        drain(&scheduler);
        assert!(follow_up_done.get());
        assert_eq!(scheduler.stats().total_registered, 2);
        assert_eq!(scheduler.stats().total_finalized, 2);
    }

    #[test]
    fn last_task_is_still_pending_inside_its_finalize() {
        let scheduler = Rc::new(TaskScheduler::default());
        let seen = Rc::new(Cell::new(None));

        let (inner, record) = (scheduler.clone(), seen.clone());
        scheduler.add_process(
            || {},
            move || record.set(Some((inner.finished(), inner.pending(), inner.running()))),
            || true,
        );
        drain(&scheduler);

        assert_eq!(seen.get(), Some((false, 1, 0)));
        assert!(scheduler.finished());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn counters_are_readable_while_polling() {
        let scheduler = Rc::new(TaskScheduler::default());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (inner, record) = (scheduler.clone(), seen.clone());
        scheduler.add_process(
            || {},
            || {},
            move || {
                record
                    .borrow_mut()
                    .push((inner.finished(), inner.pending(), inner.running()));
                true
            },
        );
        scheduler.tick();

        assert_eq!(*seen.borrow(), vec![(false, 1, 1)]);
        assert!(scheduler.finished());
        assert_eq!(scheduler.running(), 0);
    }

    #[test]
    fn bounded_scheduler_holds_back_extra_work() {
        let scheduler = TaskScheduler::new(SchedulerConfig::bounded(1));
        let release = Arc::new(AtomicBool::new(false));
        let first_done = Arc::new(AtomicBool::new(false));
        let second_started = Arc::new(AtomicBool::new(false));

        let (gate, done) = (release.clone(), first_done.clone());
        let poll_done = first_done.clone();
        scheduler.add_process(
            move || {
                while !gate.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                done.store(true, Ordering::SeqCst);
            },
            || {},
            move || poll_done.load(Ordering::SeqCst),
        );

        let started = second_started.clone();
        let poll_started = second_started.clone();
        scheduler.add_process(
            move || started.store(true, Ordering::SeqCst),
            || {},
            move || poll_started.load(Ordering::SeqCst),
        );

        assert_eq!(scheduler.running(), 1);
        for _ in 0..5 {
            scheduler.tick();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(!second_started.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending(), 2);

        release.store(true, Ordering::SeqCst);
        drain(&scheduler);
        assert!(second_started.load(Ordering::SeqCst));
    }

    #[test]
    fn unbounded_scheduler_starts_everything() {
        let scheduler = TaskScheduler::default();
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(AtomicBool::new(false));

        for _ in 0..8 {
            let (count, gate) = (started.clone(), release.clone());
            let poll_gate = release.clone();
            scheduler.add_process(
                move || {
                    count.fetch_add(1, Ordering::SeqCst);
                    while !gate.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                },
                || {},
                move || poll_gate.load(Ordering::SeqCst),
            );
        }
        assert_eq!(scheduler.running(), 8);

        let deadline = Instant::now() + Duration::from_secs(5);
        while started.load(Ordering::SeqCst) < 8 {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        release.store(true, Ordering::SeqCst);
        drain(&scheduler);
    }

    #[test]
    fn bounded_config_never_drops_to_zero() {
        assert_eq!(SchedulerConfig::bounded(0).max_running, Some(1));
        assert_eq!(SchedulerConfig::unbounded().max_running, None);
    }
}
