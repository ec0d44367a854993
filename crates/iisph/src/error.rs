//! Error types for solver construction.
//!
//! Only construction can fail. Anomalies during a step (flyaways, relocation
//! misses, a pressure solve that hits its cap) are reported through
//! [`StepReport`](crate::solver::StepReport) and the log instead.

use glam::{IVec3, Vec3};
use thiserror::Error;

/// Errors from the Morton (Z-order) index mapping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZCurveError {
    /// At least one per-axis cell bound is below zero.
    #[error("z-curve cannot be built with negative cell bounds {bounds}")]
    NegativeBounds {
        /// The offending bounds
        bounds: IVec3,
    },

    /// At least one per-axis cell bound does not fit the interleaved index.
    #[error("z-curve cell bounds {bounds} exceed the per-axis limit {limit}")]
    TooLarge {
        /// The offending bounds
        bounds: IVec3,
        /// Largest accepted cell bound per axis
        limit: i32,
    },
}

/// Errors from building a spatial grid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// `max - min` is zero or negative along at least one axis.
    #[error("grid extent {extent} must be positive on every axis")]
    NonPositiveExtent {
        /// `max - min` as passed in
        extent: Vec3,
    },

    /// Cell size is zero, negative or not finite.
    #[error("grid cell size must be positive, got {0}")]
    InvalidCellSize(f32),

    /// `extent / cell_size` asks for more cells than a grid may allocate.
    #[error("grid needs {cells} cells per axis, more than the {limit} cell limit")]
    TooManyCells {
        /// Requested cells per axis, before any integer conversion
        cells: Vec3,
        /// Largest accepted total cell count
        limit: usize,
    },

    /// The Morton mapping rejected the grid's cell bounds.
    #[error(transparent)]
    ZCurve(#[from] ZCurveError),
}

/// Errors from validating or loading a [`SolverConfig`](crate::config::SolverConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A parameter that must be strictly positive is not.
    #[error("config parameter `{name}` must be positive, got {value}")]
    NonPositive {
        /// Field name
        name: &'static str,
        /// Value found
        value: f64,
    },

    /// A parameter is NaN or infinite.
    #[error("config parameter `{name}` must be finite, got {value}")]
    NotFinite {
        /// Field name
        name: &'static str,
        /// Value found
        value: f64,
    },

    /// Reading or writing the config file failed.
    #[error("config i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON for [`SolverConfig`](crate::config::SolverConfig).
    #[error("config json is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Any error that can prevent a solver from being built.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("invalid solver config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build neighbor search: {0}")]
    Grid(#[from] GridError),
}
