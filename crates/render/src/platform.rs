//! Window-system seam: where events come from and where frames go.

use std::collections::VecDeque;
use std::time::Duration;

use sensorview_common::ScreenSize;

/// How long the driver may wait for window-system events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Nothing is loading: sleep until the next event.
    Blocking,
    /// Loads are pending: wake up after at most this long.
    Timeout(Duration),
}

/// Window-system events the driver reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    Resized(ScreenSize),
    /// The camera was moved or zoomed by input.
    CameraMoved,
    RedrawRequested,
    CloseRequested,
}

/// Pull-style source of window-system events.
pub trait EventSource {
    /// Wait according to `mode` and return the events that arrived.
    fn wait_events(&mut self, mode: WaitMode) -> Vec<PlatformEvent>;
}

/// Target of finished frames.
pub trait Presenter {
    /// Bind the graphics context to the calling thread.
    fn make_current(&mut self) {}

    fn swap_buffers(&mut self);
}

/// Event source without a window.
///
/// Returns scripted batches first. After that, a timed wait sleeps (when
/// enabled) and returns nothing, and a blocking wait returns
/// [`PlatformEvent::CloseRequested`] because no event can ever arrive.
#[derive(Debug, Default)]
pub struct HeadlessEvents {
    script: VecDeque<Vec<PlatformEvent>>,
    sleep_on_timeout: bool,
    waits: Vec<WaitMode>,
}

impl HeadlessEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Really sleep for timed waits, like a window system would.
    pub fn sleeping() -> Self {
        Self {
            sleep_on_timeout: true,
            ..Self::default()
        }
    }

    /// Queue a batch returned by one future wait.
    pub fn push_batch(&mut self, events: impl IntoIterator<Item = PlatformEvent>) {
        self.script.push_back(events.into_iter().collect());
    }

    /// Wait modes requested so far.
    pub fn waits(&self) -> &[WaitMode] {
        &self.waits
    }
}

impl EventSource for HeadlessEvents {
    fn wait_events(&mut self, mode: WaitMode) -> Vec<PlatformEvent> {
        self.waits.push(mode);
        if let Some(batch) = self.script.pop_front() {
            return batch;
        }
        match mode {
            WaitMode::Blocking => vec![PlatformEvent::CloseRequested],
            WaitMode::Timeout(timeout) => {
                if self.sleep_on_timeout {
                    std::thread::sleep(timeout);
                }
                Vec::new()
            }
        }
    }
}

/// Presenter without a surface. Counts what it was asked to do.
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    pub made_current: u64,
    pub swaps: u64,
}

impl Presenter for HeadlessPresenter {
    fn make_current(&mut self) {
        self.made_current += 1;
    }

    fn swap_buffers(&mut self) {
        self.swaps += 1;
    }
}
