//! Marker-controlled splitting of touching objects.
//!
//! The foreground's Euclidean distance transform is searched for local maxima
//! (peaks within `tolerance` of a higher peak merge into it), labels grow
//! downhill from the peaks in strict distance order, and pixels where two
//! labels meet become watershed lines. ANDing the line image back into the
//! mask cuts touching blobs into separate connected components.

use std::collections::BinaryHeap;
use std::collections::VecDeque;

use crate::mask::{Mask, BACKGROUND, FOREGROUND};

const NO_LABEL: u32 = 0;
const LINE: u32 = u32::MAX;

/// A pixel queued for label growth, ordered by distance descending with a
/// deterministic index tie-break.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Pending {
    dist: f32,
    idx: u32,
    label: u32,
}

impl Eq for Pending {}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Split touching foreground blobs, mutating the mask in place.
///
/// `tolerance` is the maximum distance-map prominence a side peak may have
/// and still merge into a neighboring higher peak. No-op when the distance
/// map yields no maxima (empty mask).
///
/// Idempotent: re-running on an already-split mask leaves it unchanged, since
/// every remaining component carries a single merged peak.
pub fn split_objects(mask: &mut Mask, tolerance: f32) {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let dist = foreground_distance(mask);
    let labels = grow_from_maxima(mask, &dist, tolerance);
    let Some(labels) = labels else {
        return;
    };

    // AND step: watershed lines and unclaimed pixels leave the foreground.
    for (i, p) in mask.iter_mut().enumerate() {
        if *p == FOREGROUND && (labels[i] == NO_LABEL || labels[i] == LINE) {
            *p = BACKGROUND;
        }
    }
}

/// Euclidean distance of every foreground pixel to the nearest background
/// pixel (0.0 on background).
fn foreground_distance(mask: &Mask) -> Vec<f32> {
    let (w, h) = mask.dimensions();
    let mut inverted = Mask::new(w, h);
    for (dst, src) in inverted.iter_mut().zip(mask.iter()) {
        *dst = if *src == BACKGROUND { FOREGROUND } else { BACKGROUND };
    }
    let squared = imageproc::distance_transform::euclidean_squared_distance_transform(&inverted);
    squared.pixels().map(|p| (p[0] as f32).sqrt()).collect()
}

/// Find tolerance-merged maxima of `dist` and grow labels downhill from them.
/// Returns `None` when no maxima exist.
fn grow_from_maxima(mask: &Mask, dist: &[f32], tolerance: f32) -> Option<Vec<u32>> {
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    let data = mask.as_raw();

    // Foreground pixels sorted by distance descending, index ascending on ties,
    // so peak discovery and label assignment are deterministic.
    let mut order: Vec<u32> = (0..(w * h) as u32)
        .filter(|&i| data[i as usize] == FOREGROUND)
        .collect();
    if order.is_empty() {
        return None;
    }
    order.sort_unstable_by(|&a, &b| {
        dist[b as usize]
            .total_cmp(&dist[a as usize])
            .then_with(|| a.cmp(&b))
    });

    let neighbors = |i: u32| -> NeighborIter {
        NeighborIter::new(i as usize, w, h)
    };

    // Peak discovery: descend the sorted pixels. Each unvisited candidate
    // floods the connected region within `tolerance` of its own height and
    // notes which existing basins the flood touches. Touching one basin means
    // the candidate is not a maximum; the flood is absorbed into that basin.
    // Touching two basins means saddle territory, left unlabeled for the
    // ordered growth below. Only a flood touching no basin seeds a new peak.
    let mut labels = vec![NO_LABEL; w * h];
    let mut visited = vec![false; w * h];
    let mut n_peaks = 0u32;
    let mut flood = Vec::new();
    let mut queue = VecDeque::new();
    for &i in &order {
        let i = i as usize;
        if visited[i] {
            continue;
        }
        let peak_value = dist[i];
        visited[i] = true;
        flood.clear();
        flood.push(i);
        queue.clear();
        queue.push_back(i);
        let mut touching = NO_LABEL;
        let mut saddle = false;
        while let Some(j) = queue.pop_front() {
            for k in neighbors(j as u32) {
                if data[k] != FOREGROUND {
                    continue;
                }
                let l = labels[k];
                if l != NO_LABEL {
                    if touching == NO_LABEL {
                        touching = l;
                    } else if touching != l {
                        saddle = true;
                    }
                } else if !visited[k] && dist[k] >= peak_value - tolerance {
                    visited[k] = true;
                    flood.push(k);
                    queue.push_back(k);
                }
            }
        }
        if saddle {
            continue;
        }
        let label = if touching == NO_LABEL {
            n_peaks += 1;
            n_peaks
        } else {
            touching
        };
        for &j in &flood {
            labels[j] = label;
        }
    }
    if n_peaks == 0 {
        return None;
    }

    // Seeded growth: claim remaining foreground in strict distance order.
    // A pixel adjacent to two different labels becomes a watershed line and
    // does not propagate.
    let mut heap = BinaryHeap::new();
    for i in 0..(w * h) {
        if labels[i] == NO_LABEL {
            continue;
        }
        let label = labels[i];
        for k in neighbors(i as u32) {
            if data[k] == FOREGROUND && labels[k] == NO_LABEL {
                heap.push(Pending {
                    dist: dist[k],
                    idx: k as u32,
                    label,
                });
            }
        }
    }
    while let Some(p) = heap.pop() {
        let i = p.idx as usize;
        if labels[i] != NO_LABEL {
            continue;
        }
        let mut claim = NO_LABEL;
        let mut contested = false;
        for k in neighbors(p.idx) {
            let l = labels[k];
            if l != NO_LABEL && l != LINE {
                if claim == NO_LABEL {
                    claim = l;
                } else if claim != l {
                    contested = true;
                    break;
                }
            }
        }
        if contested {
            labels[i] = LINE;
            continue;
        }
        if claim == NO_LABEL {
            claim = p.label;
        }
        labels[i] = claim;
        for k in neighbors(p.idx) {
            if data[k] == FOREGROUND && labels[k] == NO_LABEL {
                heap.push(Pending {
                    dist: dist[k],
                    idx: k as u32,
                    label: claim,
                });
            }
        }
    }

    Some(labels)
}

/// 8-neighborhood of a linear index, in-bounds only.
struct NeighborIter {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
    step: usize,
}

impl NeighborIter {
    fn new(i: usize, w: usize, h: usize) -> Self {
        Self {
            x: i % w,
            y: i / w,
            w,
            h,
            step: 0,
        }
    }
}

impl Iterator for NeighborIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        const OFFSETS: [(isize, isize); 8] = [
            (-1, -1),
            (0, -1),
            (1, -1),
            (-1, 0),
            (1, 0),
            (-1, 1),
            (0, 1),
            (1, 1),
        ];
        while self.step < 8 {
            let (dx, dy) = OFFSETS[self.step];
            self.step += 1;
            let nx = self.x as isize + dx;
            let ny = self.y as isize + dy;
            if nx >= 0 && ny >= 0 && (nx as usize) < self.w && (ny as usize) < self.h {
                return Some(ny as usize * self.w + nx as usize);
            }
        }
        None
    }
}
