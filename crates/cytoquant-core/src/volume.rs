//! Multi-channel, multi-slice image volume abstraction.
//!
//! The pipeline reads intensity planes through the [`ImageVolume`] trait and
//! never loads or decodes image files itself. Channels and slices are
//! **1-based** throughout, matching the `Z` and `C{n}` columns of the result
//! table.

use image::{ImageBuffer, Luma};

use crate::error::PipelineError;

/// A single-channel, single-slice intensity plane.
pub type Plane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Physical pixel size in calibrated units (e.g. µm per pixel).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Calibration {
    /// Physical width of one pixel.
    pub pixel_width: f64,
    /// Physical height of one pixel.
    pub pixel_height: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixel_width: 1.0,
            pixel_height: 1.0,
        }
    }
}

/// Read access to an ordered collection of intensity planes indexed by
/// `(channel, slice)`, both 1-based.
///
/// Implementations own their pixel data; the pipeline only borrows planes and
/// never mutates them.
pub trait ImageVolume {
    /// Plane width in pixels.
    fn width(&self) -> u32;
    /// Plane height in pixels.
    fn height(&self) -> u32;
    /// Number of channels (C).
    fn n_channels(&self) -> usize;
    /// Number of z-slices (Z).
    fn n_slices(&self) -> usize;
    /// Physical pixel size.
    fn calibration(&self) -> Calibration;
    /// Source identifier reported in the `Image` column of result rows.
    fn title(&self) -> &str {
        ""
    }
    /// Intensity plane for `(channel, slice)`, or `None` when out of range.
    fn plane(&self, channel: usize, slice: usize) -> Option<&Plane>;
}

/// An owned, in-memory [`ImageVolume`]: planes stored channel-major per slice
/// (channel varies fastest), the layout of an interleaved acquisition stack.
#[derive(Debug, Clone)]
pub struct PlaneStack {
    title: String,
    width: u32,
    height: u32,
    n_channels: usize,
    n_slices: usize,
    calibration: Calibration,
    planes: Vec<Plane>,
}

impl PlaneStack {
    /// Build a stack from `n_channels * n_slices` planes in channel-major
    /// order. All planes must share the same dimensions.
    pub fn new(
        title: impl Into<String>,
        n_channels: usize,
        n_slices: usize,
        calibration: Calibration,
        planes: Vec<Plane>,
    ) -> Result<Self, PipelineError> {
        assert!(
            n_channels > 0 && n_slices > 0,
            "plane stack must have at least one channel and one slice"
        );
        assert_eq!(
            planes.len(),
            n_channels * n_slices,
            "plane count must equal n_channels * n_slices"
        );

        let (width, height) = planes[0].dimensions();
        for plane in &planes[1..] {
            if plane.dimensions() != (width, height) {
                return Err(PipelineError::ShapeMismatch {
                    expected: (width, height),
                    actual: plane.dimensions(),
                });
            }
        }

        Ok(Self {
            title: title.into(),
            width,
            height,
            n_channels,
            n_slices,
            calibration,
            planes,
        })
    }

    /// Convenience constructor for a single-channel, single-slice volume.
    pub fn from_single_plane(
        title: impl Into<String>,
        calibration: Calibration,
        plane: Plane,
    ) -> Self {
        Self::new(title, 1, 1, calibration, vec![plane]).expect("one plane is always consistent")
    }
}

impl ImageVolume for PlaneStack {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn n_channels(&self) -> usize {
        self.n_channels
    }

    fn n_slices(&self) -> usize {
        self.n_slices
    }

    fn calibration(&self) -> Calibration {
        self.calibration
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn plane(&self, channel: usize, slice: usize) -> Option<&Plane> {
        if channel == 0 || channel > self.n_channels || slice == 0 || slice > self.n_slices {
            return None;
        }
        self.planes.get((slice - 1) * self.n_channels + (channel - 1))
    }
}
