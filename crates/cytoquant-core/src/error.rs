//! Pipeline error types.
//!
//! Configuration problems fail fast before any slice is processed; a shape
//! mismatch between masks is fatal for the slice that produced it but does
//! not abort the rest of a batch (see [`crate::pipeline::SliceReport`]).

/// Errors produced by pipeline configuration validation and mask fusion.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Band-pass base scale must be finite and strictly positive.
    NonPositiveSigma { sigma: f64 },
    /// DoG scale ratio must be finite and greater than one.
    ScaleRatioNotAboveOne { scale_ratio: f64 },
    /// Area band must satisfy `0 <= min_area <= max_area`, both finite.
    InvertedAreaBand { min_area: f64, max_area: f64 },
    /// Watershed tolerance must be finite and non-negative.
    NegativeTolerance { tolerance: f32 },
    /// Fusion mode was requested with an empty fusion channel set.
    EmptyFusionSet,
    /// A configured channel index is outside the volume's channel range.
    BadChannel { channel: usize, n_channels: usize },
    /// A configured slice index is outside the volume's slice range.
    BadSlice { slice: usize, n_slices: usize },
    /// Masks being combined have differing dimensions.
    ShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveSigma { sigma } => {
                write!(f, "sigma must be finite and > 0, got {}", sigma)
            }
            Self::ScaleRatioNotAboveOne { scale_ratio } => {
                write!(f, "scale ratio must be finite and > 1, got {}", scale_ratio)
            }
            Self::InvertedAreaBand { min_area, max_area } => {
                write!(
                    f,
                    "area band is invalid: min_area={}, max_area={}",
                    min_area, max_area
                )
            }
            Self::NegativeTolerance { tolerance } => {
                write!(
                    f,
                    "watershed tolerance must be finite and >= 0, got {}",
                    tolerance
                )
            }
            Self::EmptyFusionSet => write!(f, "fusion mode requires at least one fusion channel"),
            Self::BadChannel {
                channel,
                n_channels,
            } => {
                write!(
                    f,
                    "channel {} out of range (volume has {} channels)",
                    channel, n_channels
                )
            }
            Self::BadSlice { slice, n_slices } => {
                write!(
                    f,
                    "slice {} out of range (volume has {} slices)",
                    slice, n_slices
                )
            }
            Self::ShapeMismatch { expected, actual } => {
                write!(
                    f,
                    "mask shape mismatch: expected {}x{}, got {}x{}",
                    expected.0, expected.1, actual.0, actual.1
                )
            }
        }
    }
}

impl std::error::Error for PipelineError {}
