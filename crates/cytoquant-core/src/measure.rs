//! Per-object shape descriptors, intensity statistics, and result rows.
//!
//! Unit convention (intentional): the `area` and Feret columns are reported
//! in physical units, while the perimeter feeding circularity stays in raw
//! pixel units, so circularity is a pure pixel-space quantity. Downstream
//! analysis depends on this mix; do not "fix" it.

use imageproc::geometry::convex_hull;
use imageproc::point::Point;

use crate::regions::Region;
use crate::volume::Plane;

/// Pixel-space shape descriptors of one region.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShapeDescriptors {
    /// Area in pixels.
    pub pixel_area: f64,
    /// Closed outer-boundary length in pixels.
    pub perimeter_px: f64,
    /// Maximum caliper length in pixels.
    pub feret_max_px: f64,
    /// Minimum caliper length in pixels.
    pub feret_min_px: f64,
    /// `4*pi*area / perimeter^2`, pixel units.
    pub circularity: f64,
}

impl ShapeDescriptors {
    /// Measure a region's outer boundary and pixel area.
    pub fn from_region(region: &Region) -> Self {
        let pixel_area = region.pixel_area() as f64;
        let perimeter_px = polygon_perimeter(&region.polygon);
        let (feret_max_px, feret_min_px) = feret_lengths(&region.polygon);
        let circularity = if perimeter_px > 0.0 {
            4.0 * std::f64::consts::PI * pixel_area / (perimeter_px * perimeter_px)
        } else {
            0.0
        };
        Self {
            pixel_area,
            perimeter_px,
            feret_max_px,
            feret_min_px,
            circularity,
        }
    }
}

/// Length of a closed polygon over pixel-center vertices.
fn polygon_perimeter(polygon: &[[i32; 2]]) -> f64 {
    if polygon.len() < 2 {
        return 0.0;
    }
    let mut length = 0.0;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        let dx = (b[0] - a[0]) as f64;
        let dy = (b[1] - a[1]) as f64;
        length += (dx * dx + dy * dy).sqrt();
    }
    length
}

/// Maximum and minimum caliper (Feret) lengths of a boundary.
///
/// Max Feret is the hull diameter; min Feret comes from rotating calipers
/// over the hull edges (the minimum width is always attained perpendicular
/// to some hull edge).
fn feret_lengths(polygon: &[[i32; 2]]) -> (f64, f64) {
    let points: Vec<Point<i32>> = polygon.iter().map(|p| Point::new(p[0], p[1])).collect();
    if points.len() < 2 {
        return (0.0, 0.0);
    }
    let hull = convex_hull(points);
    if hull.len() < 2 {
        return (0.0, 0.0);
    }

    let mut max_sq = 0.0f64;
    for i in 0..hull.len() {
        for j in (i + 1)..hull.len() {
            let dx = (hull[j].x - hull[i].x) as f64;
            let dy = (hull[j].y - hull[i].y) as f64;
            max_sq = max_sq.max(dx * dx + dy * dy);
        }
    }
    let feret_max = max_sq.sqrt();

    let mut feret_min = f64::MAX;
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let ex = (b.x - a.x) as f64;
        let ey = (b.y - a.y) as f64;
        let len = (ex * ex + ey * ey).sqrt();
        if len == 0.0 {
            continue;
        }
        let mut width = 0.0f64;
        for p in &hull {
            let px = (p.x - a.x) as f64;
            let py = (p.y - a.y) as f64;
            width = width.max((ex * py - ey * px).abs() / len);
        }
        feret_min = feret_min.min(width);
    }
    if feret_min == f64::MAX {
        feret_min = 0.0;
    }
    (feret_max, feret_min)
}

/// Intensity statistics of one channel restricted to a region.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IntensityStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl IntensityStats {
    /// Measure a plane over the given pixel set. Sample standard deviation
    /// (n-1 denominator), 0.0 for single-pixel regions.
    pub fn measure(plane: &Plane, pixels: &[(u32, u32)]) -> Self {
        let n = pixels.len() as f64;
        if pixels.is_empty() {
            return Self {
                mean: 0.0,
                min: 0.0,
                max: 0.0,
                std_dev: 0.0,
            };
        }
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &(x, y) in pixels {
            let v = plane.get_pixel(x, y)[0] as f64;
            sum += v;
            sum_sq += v * v;
            min = min.min(v);
            max = max.max(v);
        }
        let mean = sum / n;
        let std_dev = if n > 1.0 {
            let variance = (n * sum_sq - sum * sum) / n / (n - 1.0);
            if variance > 0.0 {
                variance.sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };
        Self {
            mean,
            min,
            max,
            std_dev,
        }
    }
}

/// Per-channel statistic kind, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStat {
    Mean,
    Min,
    Max,
    StdDev,
}

impl ChannelStat {
    pub const ALL: [ChannelStat; 4] = [Self::Mean, Self::Min, Self::Max, Self::StdDev];

    fn suffix(self) -> &'static str {
        match self {
            Self::Mean => "Mean",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::StdDev => "StdDev",
        }
    }
}

/// Column key for one (channel, statistic) pair, e.g. `C3Mean`.
pub fn channel_column(channel: usize, stat: ChannelStat) -> String {
    format!("C{}{}", channel, stat.suffix())
}

/// The full result-table schema for a volume with `n_channels` channels.
pub fn result_columns(n_channels: usize) -> Vec<String> {
    let mut columns: Vec<String> = [
        "Image",
        "X",
        "Y",
        "Z",
        "Area",
        "Max Feret",
        "Min Feret",
        "Feret Ratio",
        "Circularity",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for c in 1..=n_channels {
        for stat in ChannelStat::ALL {
            columns.push(channel_column(c, stat));
        }
    }
    columns
}

/// One accepted object: shape columns plus per-channel intensity statistics,
/// ordered by channel index.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultRow {
    /// Source image identifier.
    pub image: String,
    /// Bounding-box center X, pixels.
    pub x: f64,
    /// Bounding-box center Y, pixels.
    pub y: f64,
    /// 1-based slice index.
    pub z: usize,
    /// Physical area (pixel area scaled by pixel width and height).
    pub area: f64,
    /// Maximum Feret length, physical units.
    pub feret_max: f64,
    /// Minimum Feret length, physical units.
    pub feret_min: f64,
    /// min/max Feret ratio, unitless.
    pub feret_ratio: f64,
    /// Pixel-space circularity (see module docs).
    pub circularity: f64,
    /// Intensity statistics for channels `1..=C`.
    pub channel_stats: Vec<IntensityStats>,
}

impl ResultRow {
    /// Flatten the row into the order given by [`result_columns`].
    pub fn record(&self) -> Vec<String> {
        let mut record = vec![
            self.image.clone(),
            self.x.to_string(),
            self.y.to_string(),
            self.z.to_string(),
            self.area.to_string(),
            self.feret_max.to_string(),
            self.feret_min.to_string(),
            self.feret_ratio.to_string(),
            self.circularity.to_string(),
        ];
        for stats in &self.channel_stats {
            record.push(stats.mean.to_string());
            record.push(stats.min.to_string());
            record.push(stats.max.to_string());
            record.push(stats.std_dev.to_string());
        }
        record
    }
}
