//! Region extraction: binary mask to closed polygonal regions.
//!
//! Connected components (8-connectivity) supply exact pixel membership and
//! bounding boxes; border following supplies the closed outer polygon and any
//! hole polygons per component. Region order is contour discovery (raster
//! scan) order and is not sorted by position.

use image::Luma;
use imageproc::contours::{find_contours, BorderType};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::mask::Mask;

/// Integer bounding box of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    /// Center of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

/// One detected object: a closed outer polygon, its holes, and the exact set
/// of member pixels.
#[derive(Debug, Clone)]
pub struct Region {
    /// 1-based slice the region was found on.
    pub slice: usize,
    /// Closed outer boundary, pixel-center coordinates.
    pub polygon: Vec<[i32; 2]>,
    /// Hole boundaries enclosed by the outer polygon.
    pub holes: Vec<Vec<[i32; 2]>>,
    /// Member pixels (hole pixels excluded).
    pub pixels: Vec<(u32, u32)>,
    /// Bounding box over the member pixels.
    pub bounds: Bounds,
}

impl Region {
    /// Area in pixels.
    pub fn pixel_area(&self) -> usize {
        self.pixels.len()
    }
}

/// Extract one [`Region`] per foreground connected component of `mask`.
///
/// An empty or all-background mask yields an empty sequence.
pub fn extract_regions(mask: &Mask, slice: usize) -> Vec<Region> {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let labeled = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let max_label = labeled.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    if max_label == 0 {
        return Vec::new();
    }

    // Gather member pixels per label in one pass.
    let mut pixels_by_label: Vec<Vec<(u32, u32)>> = vec![Vec::new(); max_label + 1];
    for (x, y, p) in labeled.enumerate_pixels() {
        let label = p[0] as usize;
        if label > 0 {
            pixels_by_label[label].push((x, y));
        }
    }

    let contours = find_contours::<i32>(mask);
    let mut regions = Vec::new();
    // Maps contour index -> region index, for attaching hole children.
    let mut region_of_contour = vec![usize::MAX; contours.len()];

    for (ci, contour) in contours.iter().enumerate() {
        match contour.border_type {
            BorderType::Outer => {
                let p0 = contour.points[0];
                let label = labeled.get_pixel(p0.x as u32, p0.y as u32)[0] as usize;
                let pixels = std::mem::take(&mut pixels_by_label[label]);
                debug_assert!(!pixels.is_empty(), "outer contour without pixels");
                let bounds = pixel_bounds(&pixels);
                region_of_contour[ci] = regions.len();
                regions.push(Region {
                    slice,
                    polygon: contour.points.iter().map(|p| [p.x, p.y]).collect(),
                    holes: Vec::new(),
                    pixels,
                    bounds,
                });
            }
            BorderType::Hole => {
                if let Some(parent) = contour.parent {
                    let ri = region_of_contour[parent];
                    if ri != usize::MAX {
                        regions[ri]
                            .holes
                            .push(contour.points.iter().map(|p| [p.x, p.y]).collect());
                    }
                }
            }
        }
    }

    regions
}

fn pixel_bounds(pixels: &[(u32, u32)]) -> Bounds {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    for &(x, y) in pixels {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    Bounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{disk_mask, merge_masks, ring_mask};

    #[test]
    fn disjoint_disks_become_separate_regions() {
        let a = disk_mask(100, 100, 30.0, 30.0, 6.0);
        let b = disk_mask(100, 100, 70.0, 70.0, 3.0);
        let mask = merge_masks(&a, &b);

        let regions = extract_regions(&mask, 3);
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.slice == 3));

        let mut areas: Vec<usize> = regions.iter().map(Region::pixel_area).collect();
        areas.sort_unstable();
        assert!(areas[0] > 20 && areas[0] < 40, "r=3 disk area {}", areas[0]);
        assert!(areas[1] > 95 && areas[1] < 135, "r=6 disk area {}", areas[1]);
    }

    #[test]
    fn hole_pixels_are_excluded_and_hole_polygon_attached() {
        let mask = ring_mask(41, 41, 20.0, 20.0, 12.0, 8.0);
        let regions = extract_regions(&mask, 1);
        assert_eq!(regions.len(), 1);

        let region = &regions[0];
        assert_eq!(region.holes.len(), 1);
        assert!(!region.pixels.contains(&(20, 20)));

        let annulus = (std::f64::consts::PI * (12.0 * 12.0 - 8.0 * 8.0)) as usize;
        let area = region.pixel_area();
        assert!(
            area > annulus * 3 / 4 && area < annulus * 5 / 4,
            "annulus area {}",
            area
        );
    }

    #[test]
    fn bounds_cover_the_component() {
        let mask = disk_mask(50, 50, 25.0, 25.0, 5.0);
        let regions = extract_regions(&mask, 1);
        assert_eq!(regions.len(), 1);
        let b = regions[0].bounds;
        assert_eq!(b.center(), (25.5, 25.5));
        assert!(b.width >= 10 && b.width <= 12);
    }

    #[test]
    fn empty_mask_yields_no_regions() {
        let mask = Mask::new(20, 20);
        assert!(extract_regions(&mask, 1).is_empty());
    }
}
