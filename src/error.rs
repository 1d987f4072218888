use thiserror::Error;

use crate::turn::Phase;

/// Raster bytes or a gateway payload that cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("raster codec error: {0}")]
    Codec(String),
    #[error("raster must have non-zero width and height (got {width}x{height})")]
    EmptyRaster { width: u32, height: u32 },
    #[error("raster holds {actual} samples, expected {expected}")]
    SampleCount { expected: usize, actual: usize },
    #[error("raster is {width}x{height}, grid expects {expected_width}x{expected_height}")]
    GridMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("delta references cell {idx} outside a grid of {cells} cells")]
    DeltaOutOfGrid { idx: usize, cells: usize },
    #[error("malformed response: {0}")]
    Schema(String),
}

impl From<image::ImageError> for DecodeError {
    fn from(value: image::ImageError) -> Self {
        DecodeError::Codec(value.to_string())
    }
}

/// Sizing problems that have to be fixed by whoever builds the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("grid must have at least one cell (got {width}x{height})")]
    EmptyGrid { width: u32, height: u32 },
    #[error(
        "grid {grid_width}x{grid_height} does not fit a {viewport_width}x{viewport_height} viewport"
    )]
    DegenerateGrid {
        grid_width: u32,
        grid_height: u32,
        viewport_width: u32,
        viewport_height: u32,
    },
    #[error("session needs at least one year")]
    NoYears,
}

/// An action that the current phase does not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} while {phase}")]
pub struct StateError {
    pub action: &'static str,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{url} answered HTTP {status}")]
    Status { status: u16, url: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Status { .. })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            GatewayError::Decode(DecodeError::Schema(value.to_string()))
        } else {
            GatewayError::Transport(value.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TurnError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("plan submission failed: {0}")]
    Submission(GatewayError),
    #[error("session could not start: {0}")]
    Start(GatewayError),
    #[error("{what} request failed: {source}")]
    Fetch {
        what: &'static str,
        source: GatewayError,
    },
}
