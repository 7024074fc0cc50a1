//! Contrast-limited adaptive histogram equalization.
//!
//! Per-tile histograms are clipped at `clip_limit` times the uniform bin
//! height, the excess is redistributed evenly, and each output pixel blends
//! the equalization mappings of its four surrounding tiles bilinearly. This
//! normalizes uneven illumination across a micrograph without amplifying
//! noise the way plain global equalization does.

use image::GrayImage;

const BINS: usize = 256;

/// Equalize `image` with a `tiles_x` x `tiles_y` tile grid.
///
/// `clip_limit` is relative: 1.0 clips at the uniform histogram height,
/// larger values allow proportionally more contrast.
pub fn clahe(image: &GrayImage, clip_limit: f64, tiles_x: u32, tiles_y: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let tiles_x = tiles_x.clamp(1, w);
    let tiles_y = tiles_y.clamp(1, h);
    let tile_w = w.div_ceil(tiles_x);
    let tile_h = h.div_ceil(tiles_y);

    // One 256-entry mapping per tile.
    let mut luts = vec![[0u8; BINS]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);

            let mut hist = [0u64; BINS];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            let pixels = ((x1 - x0) * (y1 - y0)) as u64;
            clip_histogram(&mut hist, clip_limit, pixels);

            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let mut cdf = 0u64;
            for (bin, count) in hist.iter().enumerate() {
                cdf += count;
                lut[bin] = ((cdf * 255 + pixels / 2) / pixels.max(1)) as u8;
            }
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        // Fractional tile-grid coordinate of this row's center.
        let gy = (y as f64 + 0.5) / tile_h as f64 - 0.5;
        let ty0 = gy.floor().max(0.0) as u32;
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let fy = (gy - gy.floor()).clamp(0.0, 1.0);
        let fy = if gy < 0.0 { 0.0 } else { fy };

        for x in 0..w {
            let gx = (x as f64 + 0.5) / tile_w as f64 - 0.5;
            let tx0 = gx.floor().max(0.0) as u32;
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let fx = (gx - gx.floor()).clamp(0.0, 1.0);
            let fx = if gx < 0.0 { 0.0 } else { fx };

            let v = image.get_pixel(x, y).0[0] as usize;
            let top = lut_at(tx0, ty0)[v] as f64 * (1.0 - fx) + lut_at(tx1, ty0)[v] as f64 * fx;
            let bottom = lut_at(tx0, ty1)[v] as f64 * (1.0 - fx) + lut_at(tx1, ty1)[v] as f64 * fx;
            let blended = top * (1.0 - fy) + bottom * fy;
            out.put_pixel(x, y, image::Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

fn clip_histogram(hist: &mut [u64; BINS], clip_limit: f64, pixels: u64) {
    let limit = ((clip_limit * pixels as f64 / BINS as f64).round() as u64).max(1);
    let mut excess = 0u64;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }
    // Redistribute the clipped mass evenly; the remainder goes to the low bins.
    let share = excess / BINS as u64;
    let mut remainder = excess % BINS as u64;
    for count in hist.iter_mut() {
        *count += share;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }
}
