use serde::{Deserialize, Serialize};

/// Lifecycle state of one loadable resource.
///
/// `Idle -> Decoding -> {Decoded | Failed}`, then `Decoded -> {Uploaded | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResourceState {
    #[default]
    Idle,
    Decoding,
    /// CPU-side data staged, waiting for the owner thread to upload it.
    Decoded,
    Uploaded,
    Failed,
}

impl ResourceState {
    /// True once the background phase is over (`Decoded` or later).
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Decoded | Self::Uploaded | Self::Failed)
    }

    /// True for `Uploaded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Uploaded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Decoding => "decoding",
            Self::Decoded => "decoded",
            Self::Uploaded => "uploaded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}
