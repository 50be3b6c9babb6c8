//! cytoquant — automated quantification of multi-channel fluorescence stacks.
//!
//! Segments labeled objects (typically nuclei) on every z-slice of a
//! multi-channel volume and measures their shape and per-channel intensity.
//! The pipeline stages are:
//!
//! 1. **Band-pass** – difference-of-Gaussians filter isolating blob-scale
//!    structure.
//! 2. **Threshold** – 256-bin histogram auto-threshold (Huang or Otsu).
//! 3. **Cleanup** – morphological closing and hole filling of the binary mask.
//! 4. **Split** – distance-transform watershed cutting touching objects.
//! 5. **Regions** – connected components with closed boundary polygons.
//! 6. **Fusion** (optional) – union of several channel masks into one
//!    composite object set.
//! 7. **Measure** – area band filtering, Feret calipers, circularity, and
//!    per-channel intensity statistics into a flat result table.
//!
//! # Public API
//! [`pipeline::run`] with a [`PipelineConfig`] over any [`ImageVolume`] is the
//! primary entry point; the stage modules are public for callers that need a
//! partial pipeline.

pub mod bandpass;
pub mod error;
pub mod fuse;
pub mod mask;
pub mod measure;
pub mod pipeline;
pub mod regions;
pub mod threshold;
pub mod volume;
pub mod watershed;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::PipelineError;
pub use measure::{result_columns, IntensityStats, ResultRow, ShapeDescriptors};
pub use pipeline::{
    run, LabelMask, PipelineConfig, PipelineOutput, SliceReport, SliceSelection,
};
pub use regions::{Bounds, Region};
pub use threshold::ThresholdMethod;
pub use volume::{Calibration, ImageVolume, Plane, PlaneStack};
