use std::path::{Path, PathBuf};

use crate::gpu::GpuError;

/// Errors from loading a resource.
///
/// All variants are local: they fail one resource and leave the rest running.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResourceError {
    #[error("{} not found (tried {})", .requested.display(), join_paths(.tried))]
    NotFound {
        requested: PathBuf,
        tried: Vec<PathBuf>,
    },
    #[error("failed to decode {what}: {reason}")]
    DecodeFailed { what: String, reason: String },
    #[error("failed to upload {label}: {source}")]
    UploadFailed {
        label: String,
        #[source]
        source: GpuError,
    },
}

impl ResourceError {
    pub fn decode(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::DecodeFailed {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn upload(label: impl Into<String>, source: GpuError) -> Self {
        Self::UploadFailed {
            label: label.into(),
            source,
        }
    }

    /// Short name of the variant for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not-found",
            Self::DecodeFailed { .. } => "decode-failed",
            Self::UploadFailed { .. } => "upload-failed",
        }
    }
}

/// Look `path` up as given, then under the working directory, then next to the
/// executable.
pub fn locate(path: &Path) -> Result<PathBuf, ResourceError> {
    let tried = sensorview_common::candidate_paths(path);
    match tried.iter().find(|p| p.exists()) {
        Some(found) => Ok(found.clone()),
        None => Err(ResourceError::NotFound {
            requested: path.to_path_buf(),
            tried,
        }),
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
