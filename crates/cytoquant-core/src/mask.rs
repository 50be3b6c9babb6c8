//! Binary mask cleanup: in-place morphology, flood fill and hole filling.
//!
//! Masks hold exactly two values, [`BACKGROUND`] and [`FOREGROUND`]. Hole
//! filling uses a third sentinel value internally and guarantees it never
//! leaks into the output.

use image::GrayImage;
use imageproc::distance_transform::Norm;

/// A binary mask: 0 background, 255 foreground, same dimensions as its plane.
pub type Mask = GrayImage;

/// Background mask value.
pub const BACKGROUND: u8 = 0;
/// Foreground mask value.
pub const FOREGROUND: u8 = 255;

/// Sentinel used by [`fill_holes`] while flooding border background.
const FILL_SENTINEL: u8 = 127;

/// One 3x3 dilation pass, in place.
pub fn dilate_in_place(mask: &mut Mask) {
    imageproc::morphology::dilate_mut(mask, Norm::LInf, 1);
}

/// One 3x3 erosion pass, in place.
pub fn erode_in_place(mask: &mut Mask) {
    imageproc::morphology::erode_mut(mask, Norm::LInf, 1);
}

/// Morphological closing (one dilation, one erosion) to bridge small gaps
/// without net object growth. Mutates the mask in place.
pub fn close_in_place(mask: &mut Mask) {
    dilate_in_place(mask);
    erode_in_place(mask);
}

/// Stateless 4-connected scanline flood fill: repaint the connected region of
/// `from`-valued pixels containing `(x, y)` with `to`.
pub fn flood_fill(mask: &mut Mask, x: u32, y: u32, from: u8, to: u8) {
    if from == to || mask.get_pixel(x, y)[0] != from {
        return;
    }
    let (w, h) = mask.dimensions();
    let mut stack = vec![(x, y)];
    while let Some((sx, sy)) = stack.pop() {
        if mask.get_pixel(sx, sy)[0] != from {
            continue;
        }
        // Expand to the full horizontal run through (sx, sy).
        let mut x0 = sx;
        while x0 > 0 && mask.get_pixel(x0 - 1, sy)[0] == from {
            x0 -= 1;
        }
        let mut x1 = sx;
        while x1 + 1 < w && mask.get_pixel(x1 + 1, sy)[0] == from {
            x1 += 1;
        }
        for cx in x0..=x1 {
            mask.put_pixel(cx, sy, image::Luma([to]));
            if sy > 0 && mask.get_pixel(cx, sy - 1)[0] == from {
                stack.push((cx, sy - 1));
            }
            if sy + 1 < h && mask.get_pixel(cx, sy + 1)[0] == from {
                stack.push((cx, sy + 1));
            }
        }
    }
}

/// Fill enclosed background holes, in place.
///
/// Background connected to the image border is flooded with a sentinel; any
/// pixel the border flood did not reach becomes foreground, everything it
/// reached returns to background. Idempotent.
pub fn fill_holes(mask: &mut Mask) {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    for y in 0..h {
        if mask.get_pixel(0, y)[0] == BACKGROUND {
            flood_fill(mask, 0, y, BACKGROUND, FILL_SENTINEL);
        }
        if mask.get_pixel(w - 1, y)[0] == BACKGROUND {
            flood_fill(mask, w - 1, y, BACKGROUND, FILL_SENTINEL);
        }
    }
    for x in 0..w {
        if mask.get_pixel(x, 0)[0] == BACKGROUND {
            flood_fill(mask, x, 0, BACKGROUND, FILL_SENTINEL);
        }
        if mask.get_pixel(x, h - 1)[0] == BACKGROUND {
            flood_fill(mask, x, h - 1, BACKGROUND, FILL_SENTINEL);
        }
    }
    for p in mask.iter_mut() {
        *p = if *p == FILL_SENTINEL {
            BACKGROUND
        } else {
            FOREGROUND
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{disk_mask, ring_mask};

    #[test]
    fn fill_holes_fills_an_enclosed_ring_interior() {
        let mut mask = ring_mask(41, 41, 20.0, 20.0, 12.0, 8.0);
        assert_eq!(mask.get_pixel(20, 20)[0], BACKGROUND);

        fill_holes(&mut mask);
        assert_eq!(mask.get_pixel(20, 20)[0], FOREGROUND);
        // Border-connected background stays background.
        assert_eq!(mask.get_pixel(0, 0)[0], BACKGROUND);
    }

    #[test]
    fn fill_holes_is_idempotent_and_leaks_no_sentinel() {
        let mut mask = ring_mask(41, 41, 20.0, 20.0, 12.0, 8.0);
        fill_holes(&mut mask);
        let once = mask.clone();
        fill_holes(&mut mask);
        assert_eq!(mask, once);
        assert!(mask
            .pixels()
            .all(|p| p[0] == BACKGROUND || p[0] == FOREGROUND));
    }

    #[test]
    fn closing_bridges_a_one_pixel_gap() {
        let mut mask = Mask::new(9, 9);
        for y in 0..9 {
            mask.put_pixel(3, y, image::Luma([FOREGROUND]));
            mask.put_pixel(5, y, image::Luma([FOREGROUND]));
        }
        close_in_place(&mut mask);
        assert_eq!(mask.get_pixel(4, 4)[0], FOREGROUND);
    }

    #[test]
    fn flood_fill_stays_inside_the_connected_region() {
        let mut mask = disk_mask(31, 31, 8.0, 8.0, 4.0);
        // A second disk, not connected to the first.
        for (x, y, p) in disk_mask(31, 31, 22.0, 22.0, 4.0).enumerate_pixels() {
            if p[0] == FOREGROUND {
                mask.put_pixel(x, y, *p);
            }
        }
        flood_fill(&mut mask, 8, 8, FOREGROUND, 77);
        assert_eq!(mask.get_pixel(8, 8)[0], 77);
        assert_eq!(mask.get_pixel(22, 22)[0], FOREGROUND);
    }

    #[test]
    fn all_background_mask_survives_hole_filling() {
        let mut mask = Mask::new(16, 16);
        fill_holes(&mut mask);
        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
    }
}
