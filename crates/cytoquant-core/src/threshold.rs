//! Histogram-based automatic thresholding.
//!
//! A 256-bin histogram is built over the plane's value range, the chosen
//! method selects a bin, and the bin is mapped back to a real threshold with
//! `t/255 * (max - min) + min`. Pixels `>= t` classify as foreground.

use image::Luma;

use crate::mask::{Mask, BACKGROUND, FOREGROUND};
use crate::volume::Plane;

/// Automatic threshold method applied to the 256-bin histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ThresholdMethod {
    /// Huang's fuzzy-entropy minimization.
    #[default]
    Huang,
    /// Otsu's between-class variance maximization.
    Otsu,
}

impl ThresholdMethod {
    /// Select a threshold bin in `[0, 255]` for the given histogram.
    ///
    /// The returned bin is the first foreground bin: pixels at or above its
    /// mapped value classify as foreground, pixels below it as background.
    /// A degenerate histogram (all counts in one bin) yields that bin, so a
    /// uniform plane always produces a stable threshold instead of failing.
    pub fn select_bin(self, hist: &[u32; 256]) -> usize {
        let first = match hist.iter().position(|&c| c > 0) {
            Some(i) => i,
            None => return 0,
        };
        let last = hist
            .iter()
            .rposition(|&c| c > 0)
            .expect("non-empty histogram has a last bin");
        if first == last {
            return first;
        }
        match self {
            Self::Huang => huang_bin(hist, first, last),
            Self::Otsu => otsu_bin(hist, first, last),
        }
    }
}

/// Minimum and maximum sample value of a plane. Returns `(0.0, 0.0)` for an
/// empty plane.
pub fn plane_range(plane: &Plane) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for p in plane.pixels() {
        let v = p[0];
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

/// 256-bin histogram of `plane` over `[min, max]`.
pub fn histogram_256(plane: &Plane, min: f32, max: f32) -> [u32; 256] {
    let mut hist = [0u32; 256];
    let span = max - min;
    if span <= 0.0 {
        hist[0] = plane.width() as u32 * plane.height() as u32;
        return hist;
    }
    let scale = 256.0 / span;
    for p in plane.pixels() {
        let bin = (((p[0] - min) * scale) as usize).min(255);
        hist[bin] += 1;
    }
    hist
}

/// Compute the real-valued threshold for a plane with the given method.
pub fn compute_threshold(plane: &Plane, method: ThresholdMethod) -> f32 {
    let (min, max) = plane_range(plane);
    let hist = histogram_256(plane, min, max);
    let bin = method.select_bin(&hist);
    (bin as f32 / 255.0) * (max - min) + min
}

/// Threshold a plane into a binary mask: pixels `>=` the automatic threshold
/// become foreground.
pub fn build_mask(plane: &Plane, method: ThresholdMethod) -> Mask {
    let threshold = compute_threshold(plane, method);
    let (w, h) = plane.dimensions();
    let mut mask = Mask::new(w, h);
    for (dst, src) in mask.pixels_mut().zip(plane.pixels()) {
        *dst = Luma([if src[0] >= threshold {
            FOREGROUND
        } else {
            BACKGROUND
        }]);
    }
    mask
}

/// Huang's method: pick the split minimizing the fuzziness of the two-class
/// membership, measured with Shannon entropy. The split bin is the last
/// background bin; the bin above it is returned.
fn huang_bin(hist: &[u32; 256], first: usize, last: usize) -> usize {
    // Cumulative count and weighted-count sums over [first, last].
    let n = last - first + 1;
    let mut cum_count = vec![0f64; n];
    let mut cum_weight = vec![0f64; n];
    let mut count = 0.0;
    let mut weight = 0.0;
    for (i, bin) in (first..=last).enumerate() {
        count += hist[bin] as f64;
        weight += bin as f64 * hist[bin] as f64;
        cum_count[i] = count;
        cum_weight[i] = weight;
    }

    let total_count = cum_count[n - 1];
    let total_weight = cum_weight[n - 1];
    let attenuation = 1.0 / (last - first) as f64;

    let mut best = first;
    let mut best_entropy = f64::MAX;
    for (t, bin) in (first..=last).enumerate() {
        let bg_count = cum_count[t];
        let fg_count = total_count - bg_count;
        let mu0 = if bg_count > 0.0 {
            cum_weight[t] / bg_count
        } else {
            bin as f64
        };
        let mu1 = if fg_count > 0.0 {
            (total_weight - cum_weight[t]) / fg_count
        } else {
            bin as f64
        };

        let mut entropy = 0.0;
        for i in first..=last {
            if hist[i] == 0 {
                continue;
            }
            let mu = if i <= bin { mu0 } else { mu1 };
            let membership = 1.0 / (1.0 + attenuation * (i as f64 - mu).abs());
            if membership > 1e-6 && membership < 1.0 - 1e-6 {
                let e = -membership * membership.ln()
                    - (1.0 - membership) * (1.0 - membership).ln();
                entropy += e * hist[i] as f64;
            }
        }
        if entropy < best_entropy {
            best_entropy = entropy;
            best = bin;
        }
    }
    (best + 1).min(255)
}

/// Otsu's method: pick the split maximizing between-class variance. The
/// split bin is the last background bin; the bin above it is returned.
fn otsu_bin(hist: &[u32; 256], first: usize, last: usize) -> usize {
    let mut total_count = 0.0;
    let mut total_weight = 0.0;
    for bin in first..=last {
        total_count += hist[bin] as f64;
        total_weight += bin as f64 * hist[bin] as f64;
    }

    let mut bg_count = 0.0;
    let mut bg_weight = 0.0;
    let mut best = first;
    let mut best_variance = -1.0;
    for bin in first..=last {
        bg_count += hist[bin] as f64;
        bg_weight += bin as f64 * hist[bin] as f64;
        let fg_count = total_count - bg_count;
        if bg_count == 0.0 {
            continue;
        }
        if fg_count == 0.0 {
            break;
        }
        let mean_bg = bg_weight / bg_count;
        let mean_fg = (total_weight - bg_weight) / fg_count;
        let variance = bg_count * fg_count * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if variance > best_variance {
            best_variance = variance;
            best = bin;
        }
    }
    (best + 1).min(255)
}
