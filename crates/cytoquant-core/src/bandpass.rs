//! Difference-of-Gaussians band-pass filter.
//!
//! Subtracting a wide Gaussian blur from a narrow one suppresses both
//! high-frequency noise and low-frequency background, leaving blob-scale
//! structure near the base scale. For objects much larger than the base
//! scale the response is an annulus along the object boundary; hole filling
//! downstream recovers the full extent.

use image::Luma;

use crate::volume::Plane;

/// Band-pass a plane with a difference of Gaussians at `sigma_px` and
/// `scale_ratio * sigma_px` pixels.
///
/// Returns a newly allocated plane; the input is never mutated. The
/// subtraction saturates at zero, matching the behavior of subtracting
/// unsigned pixel buffers.
///
/// `sigma_px` must be positive; the pipeline validates this before any slice
/// is processed.
pub fn dog_filter(plane: &Plane, sigma_px: f32, scale_ratio: f32) -> Plane {
    debug_assert!(sigma_px > 0.0, "sigma must be validated by the caller");
    debug_assert!(scale_ratio > 1.0, "scale ratio must be validated by the caller");

    let narrow = imageproc::filter::gaussian_blur_f32(plane, sigma_px);
    let wide = imageproc::filter::gaussian_blur_f32(plane, scale_ratio * sigma_px);

    let (w, h) = plane.dimensions();
    let mut out = Plane::new(w, h);
    for (dst, (n, v)) in out
        .pixels_mut()
        .zip(narrow.pixels().zip(wide.pixels()))
    {
        *dst = Luma([(n[0] - v[0]).max(0.0)]);
    }
    out
}
