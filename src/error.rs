//! Build-time configuration errors.
//!
//! Geometry construction either produces a layer/volume/geometry that is
//! fully navigable or fails with a [`GeometryError`]. Navigation itself never
//! returns these; see [`NavigationStage`](crate::navigation::NavigationStage).

use thiserror::Error;

use crate::binning::BinningValue;

/// Geometry construction errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("no surfaces provided to build a {0} layer")]
    EmptySurfaces(&'static str),

    #[error("invalid binning in {value:?}: {reason}")]
    InvalidBinning { value: BinningValue, reason: String },

    #[error("{count} of {total} surfaces are not reachable through the layer binning")]
    UnreachableSurfaces { count: usize, total: usize },

    #[error("invalid bounds for {what}: {reason}")]
    InvalidBounds { what: String, reason: String },

    #[error("volumes '{first}' and '{second}' cannot be stacked: {reason}")]
    NotContiguous {
        first: String,
        second: String,
        reason: String,
    },

    #[error("layer {layer} does not fit inside volume '{volume}'")]
    LayerOutsideVolume { volume: String, layer: usize },

    #[error("inconsistent configuration: {0}")]
    ConfigMismatch(String),
}

pub type Result<T> = std::result::Result<T, GeometryError>;
