//! Gradient edge detection for circle voting.
//!
//! A Canny-style detector (Sobel gradients, non-maximum suppression,
//! hysteresis) that keeps the per-pixel gradient alongside the binary
//! edge map. The circular Hough transform needs both: edge pixels decide
//! who votes, gradient directions decide where the votes land.
//!
//! Unlike `imageproc::edges::canny` no blur is applied here; callers
//! smooth the image beforehand. Hysteresis checks all eight neighbors
//! and never steps outside the image, so edges touching the border are
//! safe.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel;

/// Minimum allowed edge threshold.
///
/// A threshold of zero turns every pixel with any gradient into an edge
/// candidate, flooding the accumulator with votes.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// An edge pixel together with its image gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePoint {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Horizontal Sobel response.
    pub gx: f32,
    /// Vertical Sobel response.
    pub gy: f32,
}

/// Binary edge map plus the Sobel gradients it was computed from.
#[derive(Debug, Clone)]
pub struct EdgeField {
    gx: Image<Luma<i16>>,
    gy: Image<Luma<i16>>,
    edges: GrayImage,
}

impl EdgeField {
    /// The binary edge map: `255` for edges, `0` elsewhere.
    #[must_use]
    pub const fn edges(&self) -> &GrayImage {
        &self.edges
    }

    /// Number of edge pixels.
    #[must_use]
    pub fn edge_pixel_count(&self) -> u64 {
        self.edges
            .pixels()
            .map(|p| u64::from(u8::from(p.0[0] == 255)))
            .sum()
    }

    /// Every edge pixel with a non-zero gradient, in row-major order.
    #[must_use]
    pub fn edge_points(&self) -> Vec<EdgePoint> {
        self.edges
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == 255)
            .filter_map(|(x, y, _)| {
                let gx = f32::from(self.gx.get_pixel(x, y).0[0]);
                let gy = f32::from(self.gy.get_pixel(x, y).0[0]);
                (gx != 0.0 || gy != 0.0).then_some(EdgePoint { x, y, gx, gy })
            })
            .collect()
    }
}

/// Detect edges in an already-smoothed grayscale image.
///
/// Pixels whose gradient magnitude is at least `high_threshold` are
/// definite edges; those between the two thresholds are edges only when
/// connected to a definite edge. Both thresholds are clamped to at least
/// [`MIN_THRESHOLD`] and `low_threshold` to at most `high_threshold`.
#[must_use = "returns the edge field"]
pub fn detect(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> EdgeField {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);

    let gx: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_VERTICAL_3X3);
    let magnitude: Image<Luma<f32>> = Image::from_fn(image.width(), image.height(), |x, y| {
        let h = f32::from(gx.get_pixel(x, y).0[0]);
        let v = f32::from(gy.get_pixel(x, y).0[0]);
        Luma([h.hypot(v)])
    });

    let thinned = non_maximum_suppression(&magnitude, &gx, &gy);
    let edges = hysteresis(&thinned, low, high);
    EdgeField { gx, gy, edges }
}

/// Keep only pixels that are maximal along their gradient direction.
///
/// The one-pixel border is always suppressed.
fn non_maximum_suppression(
    g: &Image<Luma<f32>>,
    gx: &Image<Luma<i16>>,
    gy: &Image<Luma<i16>>,
) -> Image<Luma<f32>> {
    let (w, h) = g.dimensions();
    let mut out = Image::from_pixel(w, h, Luma([0.0_f32]));
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let value = g.get_pixel(x, y).0[0];
            if value == 0.0 {
                continue;
            }
            let angle = f32::from(gy.get_pixel(x, y).0[0])
                .atan2(f32::from(gx.get_pixel(x, y).0[0]))
                .to_degrees()
                .rem_euclid(180.0);
            // Neighbors across the edge, i.e. along the gradient.
            let ((x1, y1), (x2, y2)) = if !(22.5..157.5).contains(&angle) {
                ((x - 1, y), (x + 1, y))
            } else if angle < 67.5 {
                ((x + 1, y + 1), (x - 1, y - 1))
            } else if angle < 112.5 {
                ((x, y - 1), (x, y + 1))
            } else {
                ((x - 1, y + 1), (x + 1, y - 1))
            };
            if value >= g.get_pixel(x1, y1).0[0] && value >= g.get_pixel(x2, y2).0[0] {
                out.put_pixel(x, y, Luma([value]));
            }
        }
    }
    out
}

/// Trace strong edges and any weak edges connected to them.
fn hysteresis(input: &Image<Luma<f32>>, low: f32, high: f32) -> GrayImage {
    const NEIGHBORS: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];

    let (w, h) = input.dimensions();
    let mut out = GrayImage::new(w, h);
    let mut stack = Vec::new();
    for (x, y, p) in input.enumerate_pixels() {
        if p.0[0] < high || out.get_pixel(x, y).0[0] != 0 {
            continue;
        }
        out.put_pixel(x, y, Luma([255]));
        stack.push((x, y));
        while let Some((cx, cy)) = stack.pop() {
            for (dx, dy) in NEIGHBORS {
                let (Ok(nx), Ok(ny)) = (
                    u32::try_from(i64::from(cx) + dx),
                    u32::try_from(i64::from(cy) + dy),
                ) else {
                    continue;
                };
                if nx >= w || ny >= h {
                    continue;
                }
                if input.get_pixel(nx, ny).0[0] >= low && out.get_pixel(nx, ny).0[0] == 0 {
                    out.put_pixel(nx, ny, Luma([255]));
                    stack.push((nx, ny));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20x20 image with a sharp vertical boundary at x = 10.
    fn sharp_edge_image() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, _y| {
            if x < 10 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    #[test]
    fn blank_image_produces_no_edges() {
        let img = GrayImage::from_fn(20, 20, |_, _| image::Luma([128]));
        let field = detect(&img, 25.0, 50.0);
        assert_eq!(field.edge_pixel_count(), 0);
        assert!(field.edge_points().is_empty());
    }

    #[test]
    fn sharp_edge_detected_near_boundary() {
        let field = detect(&sharp_edge_image(), 25.0, 50.0);
        let points = field.edge_points();
        assert!(!points.is_empty(), "expected edges at sharp boundary");
        for p in &points {
            assert!((8..=11).contains(&p.x), "edge far from boundary at x={}", p.x);
            // Dark-to-bright left to right: positive horizontal gradient.
            assert!(p.gx > 0.0);
        }
    }

    #[test]
    fn output_dimensions_match_input() {
        let img = GrayImage::new(17, 31);
        let field = detect(&img, 25.0, 50.0);
        assert_eq!(field.edges().width(), 17);
        assert_eq!(field.edges().height(), 31);
    }

    #[test]
    fn tiny_images_do_not_panic() {
        for (w, h) in [(0, 0), (1, 1), (2, 5), (5, 2)] {
            let img = GrayImage::from_fn(w, h, |x, _| image::Luma([if x == 0 { 0 } else { 255 }]));
            let field = detect(&img, 1.0, 2.0);
            assert_eq!(field.edge_pixel_count(), 0);
        }
    }

    #[test]
    fn border_edge_does_not_panic() {
        // A bright column one pixel from the left border with thresholds
        // low enough for hysteresis to reach the border.
        let img = GrayImage::from_fn(10, 10, |x, _| image::Luma([if x == 1 { 255 } else { 0 }]));
        let _field = detect(&img, 1.0, 2.0);
    }

    #[test]
    fn zero_low_threshold_is_clamped_to_min() {
        let img = sharp_edge_image();
        assert_eq!(
            detect(&img, 0.0, 150.0).edges(),
            detect(&img, MIN_THRESHOLD, 150.0).edges()
        );
    }

    #[test]
    fn low_above_high_is_clamped() {
        let img = sharp_edge_image();
        assert_eq!(
            detect(&img, 200.0, 100.0).edges(),
            detect(&img, 100.0, 100.0).edges()
        );
    }
}
