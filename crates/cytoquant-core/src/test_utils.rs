//! Synthetic fixtures shared by unit tests.

use crate::mask::{Mask, FOREGROUND};
use crate::volume::Plane;

/// A plane with bright disks of `value` on a zero background. Disks are
/// given as `(cx, cy, r)` in pixel coordinates.
pub(crate) fn draw_disk_plane(w: u32, h: u32, disks: &[(f32, f32, f32)], value: f32) -> Plane {
    let mut plane = Plane::new(w, h);
    for (x, y, p) in plane.enumerate_pixels_mut() {
        if disks
            .iter()
            .any(|&(cx, cy, r)| inside_disk(x, y, cx, cy, r))
        {
            *p = image::Luma([value]);
        }
    }
    plane
}

/// A binary mask containing a single filled disk.
pub(crate) fn disk_mask(w: u32, h: u32, cx: f32, cy: f32, r: f32) -> Mask {
    let mut mask = Mask::new(w, h);
    for (x, y, p) in mask.enumerate_pixels_mut() {
        if inside_disk(x, y, cx, cy, r) {
            *p = image::Luma([FOREGROUND]);
        }
    }
    mask
}

/// A binary mask containing a filled annulus (disk of `r_outer` minus disk of
/// `r_inner`).
pub(crate) fn ring_mask(w: u32, h: u32, cx: f32, cy: f32, r_outer: f32, r_inner: f32) -> Mask {
    let mut mask = Mask::new(w, h);
    for (x, y, p) in mask.enumerate_pixels_mut() {
        if inside_disk(x, y, cx, cy, r_outer) && !inside_disk(x, y, cx, cy, r_inner) {
            *p = image::Luma([FOREGROUND]);
        }
    }
    mask
}

/// Pixel-wise union of two same-sized masks.
pub(crate) fn merge_masks(a: &Mask, b: &Mask) -> Mask {
    assert_eq!(a.dimensions(), b.dimensions());
    let mut out = a.clone();
    for (dst, src) in out.iter_mut().zip(b.iter()) {
        if *src == FOREGROUND {
            *dst = FOREGROUND;
        }
    }
    out
}

fn inside_disk(x: u32, y: u32, cx: f32, cy: f32, r: f32) -> bool {
    let dx = x as f32 - cx;
    let dy = y as f32 - cy;
    dx * dx + dy * dy <= r * r
}
