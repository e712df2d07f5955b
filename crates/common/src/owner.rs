use std::thread::ThreadId;

/// Identity of the thread that owns the graphics context.
///
/// Captured once by the render loop. Anything that creates or mutates GPU
/// objects can check against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerThread {
    id: ThreadId,
}

impl OwnerThread {
    /// Claim the calling thread as the owner.
    pub fn current() -> Self {
        Self {
            id: std::thread::current().id(),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// True if called from the owner thread.
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.id
    }

    /// Debug-build check that the caller is on the owner thread.
    #[track_caller]
    pub fn debug_assert_current(&self) {
        debug_assert!(
            self.is_current(),
            "graphics context touched off its owner thread"
        );
    }
}
