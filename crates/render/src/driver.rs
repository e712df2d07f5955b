use std::rc::Rc;
use std::time::{Duration, Instant};

use sensorview_bus::{DispatchCounts, EventBus, FrameEvents};
use sensorview_common::{OwnerThread, ScreenSize};
use sensorview_scheduler::TaskScheduler;

use crate::platform::{EventSource, PlatformEvent, Presenter, WaitMode};
use crate::stats::FrameStats;

/// Render-loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Longest event wait while loads are pending.
    pub poll_interval: Duration,
    /// Frames kept for the rolling frame-time statistics.
    pub stats_window: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            stats_window: 120,
        }
    }
}

/// Outcome of one [`RenderLoop::frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub finalized: usize,
    /// True when callbacks were dispatched and buffers swapped.
    pub presented: bool,
    pub dispatched: DispatchCounts,
}

/// Drives one window: waits for events, ticks the scheduler, dispatches the
/// bus and swaps when something changed.
///
/// Owned by the thread that owns the graphics context.
pub struct RenderLoop {
    config: LoopConfig,
    owner: OwnerThread,
    scheduler: Rc<TaskScheduler>,
    bus: Rc<EventBus>,
    screen: ScreenSize,
    camera_dirty: bool,
    resized: Option<ScreenSize>,
    redraw: bool,
    closing: bool,
    stats: FrameStats,
}

impl RenderLoop {
    /// The first frame always presents.
    pub fn new(
        config: LoopConfig,
        scheduler: Rc<TaskScheduler>,
        bus: Rc<EventBus>,
        screen: ScreenSize,
    ) -> Self {
        let stats = FrameStats::new(config.stats_window);
        Self {
            config,
            owner: OwnerThread::current(),
            scheduler,
            bus,
            screen,
            camera_dirty: false,
            resized: None,
            redraw: true,
            closing: false,
            stats,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Rc<TaskScheduler> {
        &self.scheduler
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// True if the next frame will dispatch and swap even without new loads.
    pub fn has_changes(&self) -> bool {
        self.camera_dirty || self.resized.is_some() || self.redraw
    }

    /// Return at once when a frame is owed, poll at `poll_interval` while loads
    /// are pending, block otherwise.
    pub fn wait_mode(&self) -> WaitMode {
        if self.has_changes() {
            WaitMode::Timeout(Duration::ZERO)
        } else if self.scheduler.finished() {
            WaitMode::Blocking
        } else {
            WaitMode::Timeout(self.config.poll_interval)
        }
    }

    pub fn handle_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::Resized(size) => self.resized(size),
            PlatformEvent::CameraMoved => self.camera_changed(),
            PlatformEvent::RedrawRequested => self.request_redraw(),
            PlatformEvent::CloseRequested => self.close(),
        }
    }

    /// Note a camera mutation. Camera callbacks fire once, at the next frame.
    pub fn camera_changed(&mut self) {
        self.camera_dirty = true;
    }

    /// Note a new drawable size. Only the latest size is dispatched.
    pub fn resized(&mut self, size: ScreenSize) {
        if size == self.screen && self.resized.is_none() {
            return;
        }
        self.screen = size;
        self.resized = Some(size);
    }

    pub fn request_redraw(&mut self) {
        self.redraw = true;
    }

    pub fn close(&mut self) {
        if !self.closing {
            tracing::info!(frames = self.stats.frames(), "render loop closing");
        }
        self.closing = true;
    }

    /// One iteration after events were handled: make current, tick, and if
    /// anything changed dispatch the bus and swap.
    pub fn frame(&mut self, presenter: &mut dyn Presenter) -> FrameReport {
        self.owner.debug_assert_current();
        let started = Instant::now();
        let _span = tracing::trace_span!("frame", n = self.stats.frames()).entered();

        presenter.make_current();
        let finalized = self.scheduler.tick();

        let mut report = FrameReport {
            finalized,
            ..FrameReport::default()
        };
        if self.has_changes() || finalized > 0 {
            let events = FrameEvents {
                camera_changed: std::mem::take(&mut self.camera_dirty),
                resized: self.resized.take(),
            };
            self.redraw = false;
            if let Some(size) = events.resized {
                tracing::debug!(%size, "screen resized");
            }
            report.dispatched = self.bus.dispatch_frame(&events);
            presenter.swap_buffers();
            report.presented = true;
        }

        self.stats
            .record(started.elapsed(), report.presented, report.finalized);
        report
    }

    /// Wait for events as [`wait_mode`](Self::wait_mode) says, handle them,
    /// then run one [`frame`](Self::frame).
    pub fn iterate(
        &mut self,
        source: &mut dyn EventSource,
        presenter: &mut dyn Presenter,
    ) -> FrameReport {
        for event in source.wait_events(self.wait_mode()) {
            self.handle_event(event);
        }
        self.frame(presenter)
    }

    /// Iterate until the loop is closed. A failing resource never stops it.
    pub fn run(&mut self, source: &mut dyn EventSource, presenter: &mut dyn Presenter) {
        self.run_until(source, presenter, |_| false);
    }

    /// Iterate until closed or until `done` returns true after a frame.
    pub fn run_until(
        &mut self,
        source: &mut dyn EventSource,
        presenter: &mut dyn Presenter,
        mut done: impl FnMut(&RenderLoop) -> bool,
    ) {
        let _span = tracing::info_span!("render_loop").entered();
        tracing::info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            screen = %self.screen,
            "render loop started"
        );
        while !self.closing {
            self.iterate(source, presenter);
            if done(self) {
                break;
            }
        }
        tracing::info!(
            frames = self.stats.frames(),
            presented = self.stats.presented(),
            finalized = self.stats.finalized(),
            avg_frame = ?self.stats.average(),
            "render loop stopped"
        );
    }
}

impl std::fmt::Debug for RenderLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLoop")
            .field("config", &self.config)
            .field("screen", &self.screen)
            .field("closing", &self.closing)
            .field("frames", &self.stats.frames())
            .finish_non_exhaustive()
    }
}
