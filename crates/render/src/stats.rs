use std::collections::VecDeque;
use std::time::Duration;

/// Per-frame counters plus a rolling window of frame times.
#[derive(Debug, Clone)]
pub struct FrameStats {
    frames: u64,
    presented: u64,
    finalized: u64,
    window: VecDeque<Duration>,
    capacity: usize,
}

impl FrameStats {
    /// Keep the last `capacity` frame times (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: 0,
            presented: 0,
            finalized: 0,
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, frame_time: Duration, presented: bool, finalized: usize) {
        self.frames += 1;
        self.finalized += finalized as u64;
        if presented {
            self.presented += 1;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(frame_time);
    }

    /// Loop iterations so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Iterations that dispatched and swapped.
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Tasks finalized over all iterations.
    pub fn finalized(&self) -> u64 {
        self.finalized
    }

    pub fn average(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        self.window.iter().sum::<Duration>() / self.window.len() as u32
    }

    pub fn min(&self) -> Duration {
        self.window.iter().copied().min().unwrap_or(Duration::ZERO)
    }

    pub fn max(&self) -> Duration {
        self.window.iter().copied().max().unwrap_or(Duration::ZERO)
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(120)
    }
}
