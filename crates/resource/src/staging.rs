use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ResourceError;
use crate::state::ResourceState;

struct Stage<T> {
    state: ResourceState,
    staged: Option<T>,
    error: Option<ResourceError>,
}

/// What the owner thread found when it came to collect the staged data.
#[derive(Debug)]
pub enum Collected<T> {
    /// Decoded data, now owned by the caller for upload.
    Staged(T),
    Failed(ResourceError),
    /// Decode still in progress, or the lock is held.
    NotReady,
    /// Already uploaded.
    Uploaded,
}

/// CPU-side staging slot shared between a worker and the owner thread.
///
/// One mutex guards the state and the staged data together. The worker holds it
/// only to publish results; decoding itself happens outside the lock.
pub struct Staging<T> {
    inner: Arc<Mutex<Stage<T>>>,
}

impl<T> Clone for Staging<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Staging<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Staging<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Stage {
                state: ResourceState::Idle,
                staged: None,
                error: None,
            })),
        }
    }

    /// Background phase: mark `Decoding`, run `decode` without holding the lock,
    /// then publish `Decoded` or `Failed`.
    ///
    /// A panic inside `decode` becomes [`ResourceError::DecodeFailed`]. Calling
    /// `run` on a slot that already left `Idle` does nothing.
    pub fn run<F>(&self, what: &str, decode: F)
    where
        F: FnOnce() -> Result<T, ResourceError>,
    {
        {
            let mut stage = self.inner.lock();
            if stage.state != ResourceState::Idle {
                tracing::warn!(what, state = %stage.state, "decode requested twice, ignoring");
                return;
            }
            stage.state = ResourceState::Decoding;
        }

        let result = catch_unwind(AssertUnwindSafe(decode))
            .unwrap_or_else(|payload| Err(ResourceError::decode(what, panic_reason(&*payload))));

        let mut stage = self.inner.lock();
        match result {
            Ok(staged) => {
                stage.staged = Some(staged);
                stage.state = ResourceState::Decoded;
            }
            Err(error) => {
                stage.error = Some(error);
                stage.state = ResourceState::Failed;
            }
        }
    }

    /// Non-blocking readiness check. False while the lock is held.
    pub fn is_ready(&self) -> bool {
        self.inner
            .try_lock()
            .is_some_and(|stage| stage.state.is_settled())
    }

    pub fn state(&self) -> ResourceState {
        self.inner.lock().state
    }

    pub fn error(&self) -> Option<ResourceError> {
        self.inner.lock().error.clone()
    }

    /// Take the staged data out for upload. The state stays `Decoded` until
    /// [`finish`](Self::finish) records the outcome.
    pub fn collect(&self) -> Collected<T> {
        let Some(mut stage) = self.inner.try_lock() else {
            return Collected::NotReady;
        };
        match stage.state {
            ResourceState::Decoded => match stage.staged.take() {
                Some(staged) => Collected::Staged(staged),
                None => Collected::NotReady,
            },
            ResourceState::Failed => match &stage.error {
                Some(error) => Collected::Failed(error.clone()),
                None => Collected::NotReady,
            },
            ResourceState::Uploaded => Collected::Uploaded,
            ResourceState::Idle | ResourceState::Decoding => Collected::NotReady,
        }
    }

    /// Record the upload outcome. The staged data is already gone.
    pub fn finish(&self, outcome: Result<(), ResourceError>) {
        let mut stage = self.inner.lock();
        stage.staged = None;
        match outcome {
            Ok(()) => stage.state = ResourceState::Uploaded,
            Err(error) => {
                stage.error = Some(error);
                stage.state = ResourceState::Failed;
            }
        }
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("decoder panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("decoder panicked: {text}")
    } else {
        "decoder panicked".to_string()
    }
}
