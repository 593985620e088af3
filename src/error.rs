use std::path::PathBuf;

use thiserror::Error;

/// Errors that invalidate the whole batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load source image {path:?}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("found {found} card candidates, grid requires {required}")]
    InsufficientDetections { found: usize, required: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors confined to a single card slot. The other slots keep going.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CardError {
    #[error("degenerate quadrilateral: {reason}")]
    DegenerateQuad { reason: String },
    #[error("empty crop at ({x}, {y}) in a {width}x{height} card")]
    EmptyCrop {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },
}

impl CardError {
    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        CardError::DegenerateQuad {
            reason: reason.into(),
        }
    }
}
