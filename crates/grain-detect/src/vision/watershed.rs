//! Marker-based watershed (Meyer's flooding algorithm).
//!
//! Seed labels flood outward over an intensity relief in order of increasing
//! gray value; where two different labels meet, the pixel becomes a ridge.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use image::GrayImage;

/// Ridge pixels separating two catchment basins.
pub const WATERSHED_RIDGE: i32 = -1;

/// An integer-labeled image: 0 = unassigned, >0 = basin labels,
/// [`WATERSHED_RIDGE`] = ridge lines.
#[derive(Debug, Clone)]
pub struct LabelMap {
    pub width: u32,
    pub height: u32,
    data: Vec<i32>,
}

impl LabelMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height) as usize],
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> i32 {
        self.data[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, label: i32) {
        self.data[(y * self.width + x) as usize] = label;
    }

    /// Largest basin label present, or 0 when the map is all background.
    pub fn max_label(&self) -> i32 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// Binary mask of the pixels carrying `label` (255 inside, 0 outside).
    pub fn mask_of(&self, label: i32) -> GrayImage {
        let mut mask = GrayImage::new(self.width, self.height);
        for (i, &l) in self.data.iter().enumerate() {
            if l == label {
                let x = i as u32 % self.width;
                let y = i as u32 / self.width;
                mask.put_pixel(x, y, image::Luma([255u8]));
            }
        }
        mask
    }
}

const NEIGHBORS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Flood `markers` over `relief`. Labels > 0 are seeds, 0 is unassigned.
///
/// On return every pixel reachable from a seed carries either a basin label
/// or [`WATERSHED_RIDGE`]. Unreachable pixels (none, in practice, since the
/// background is itself a seed) stay 0.
pub fn watershed(relief: &GrayImage, markers: &mut LabelMap) {
    let (w, h) = relief.dimensions();
    debug_assert_eq!((markers.width, markers.height), (w, h));

    // Min-heap on (intensity, insertion order): FIFO within one gray level.
    let mut heap: BinaryHeap<Reverse<(u8, u64, u32, u32)>> = BinaryHeap::new();
    let mut queued = vec![false; (w * h) as usize];
    let mut seq = 0u64;

    let push_free_neighbors =
        |markers: &LabelMap,
         heap: &mut BinaryHeap<Reverse<(u8, u64, u32, u32)>>,
         queued: &mut [bool],
         seq: &mut u64,
         x: u32,
         y: u32| {
            for (dx, dy) in NEIGHBORS {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let idx = (ny * w + nx) as usize;
                if markers.get(nx, ny) == 0 && !queued[idx] {
                    queued[idx] = true;
                    heap.push(Reverse((relief.get_pixel(nx, ny).0[0], *seq, nx, ny)));
                    *seq += 1;
                }
            }
        };

    for y in 0..h {
        for x in 0..w {
            if markers.get(x, y) > 0 {
                push_free_neighbors(markers, &mut heap, &mut queued, &mut seq, x, y);
            }
        }
    }

    while let Some(Reverse((_, _, x, y))) = heap.pop() {
        let mut label = 0i32;
        let mut ridge = false;
        for (dx, dy) in NEIGHBORS {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                continue;
            }
            let l = markers.get(nx as u32, ny as u32);
            if l > 0 {
                if label == 0 {
                    label = l;
                } else if label != l {
                    ridge = true;
                }
            }
        }

        if ridge {
            markers.set(x, y, WATERSHED_RIDGE);
        } else if label > 0 {
            markers.set(x, y, label);
            push_free_neighbors(markers, &mut heap, &mut queued, &mut seq, x, y);
        }
        // A queued pixel with no labeled neighbor left can only appear if its
        // sponsor became a ridge; it will be re-reached from another basin.
    }
}
