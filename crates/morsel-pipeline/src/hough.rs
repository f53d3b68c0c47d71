//! Circular Hough transform using the gradient method.
//!
//! Finds circles in a grayscale image in two passes:
//!
//! 1. **Center voting.** Every edge pixel casts one vote per radius step
//!    along its gradient direction (both ways, since a plate can be
//!    brighter or darker than the table). Votes accumulate in a grid that
//!    is `resolution_ratio` times coarser than the image. Local maxima
//!    above the accumulator threshold become center candidates.
//! 2. **Radius estimation.** For each candidate, strongest first, the
//!    distances from the center to all edge pixels are histogrammed in
//!    whole-pixel bins, up to the image diagonal. The three-bin window
//!    with the most edge pixels *per unit radius* gives the radius (the
//!    mean distance inside the window) and its support (the pixel count).
//!    A ring drawn from an off-center point tangent to a real rim
//!    collects more pixels the larger it is; per-radius ranking keeps it
//!    from outgrowing the rim.
//!
//! Candidates closer than `min_center_distance` to an already accepted
//! circle are discarded. So are circles whose support does not exceed the
//! accumulator threshold, or covers less than `min_rim_coverage` of the
//! part of their circumference that lies inside the image.

use crate::edge::{self, EdgePoint};
use crate::types::{GrayImage, HoughParams, Point};

/// A detected circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Center in image coordinates.
    pub center: Point,
    /// Radius in pixels.
    pub radius: f64,
    /// Number of edge pixels within one pixel of the circle.
    pub support: u32,
}

/// A local maximum of the center accumulator.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    col: usize,
    row: usize,
    votes: u32,
}

/// Circles found in one image together with the edge evidence behind
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct HoughResult {
    /// Accepted circles, strongest center first.
    pub circles: Vec<Circle>,
    /// Number of edge pixels that voted.
    pub edge_pixel_count: u64,
}

/// Detect circles in `image`, strongest center first.
///
/// Convenience wrapper around [`detect`] for callers that only need the
/// circles.
#[must_use = "returns the detected circles"]
pub fn detect_circles(image: &GrayImage, params: &HoughParams) -> Vec<Circle> {
    detect(image, params).circles
}

/// Run the transform on `image`.
///
/// The image is not smoothed here; callers blur it beforehand to keep
/// texture from producing spurious edges. The circle list is empty when
/// the image has no edges or no circle clears the thresholds.
#[must_use = "returns the detection result"]
pub fn detect(image: &GrayImage, params: &HoughParams) -> HoughResult {
    let high = params.edge_threshold;
    let field = edge::detect(image, high / 2.0, high);
    let points = field.edge_points();
    log::debug!(
        "hough: {} edge pixels in {}x{} image",
        points.len(),
        image.width(),
        image.height()
    );
    let edge_pixel_count = points.len() as u64;
    if points.is_empty() {
        return HoughResult {
            circles: Vec::new(),
            edge_pixel_count,
        };
    }

    let accumulator = Accumulator::vote(&points, image.width(), image.height(), params);
    let candidates = accumulator.candidates(params.accumulator_threshold);
    log::debug!("hough: {} center candidates", candidates.len());

    let dp = params.resolution_ratio;
    let min_distance_sq = params.min_center_distance * params.min_center_distance;
    let mut circles: Vec<Circle> = Vec::new();
    for candidate in candidates {
        #[allow(clippy::cast_precision_loss)]
        let center = Point::new(
            (candidate.col as f64 + 0.5) * dp,
            (candidate.row as f64 + 0.5) * dp,
        );
        if circles
            .iter()
            .any(|c| c.center.distance_squared(center) < min_distance_sq)
        {
            continue;
        }
        let Some((radius, support)) =
            estimate_radius(center, &points, params, image.width(), image.height())
        else {
            continue;
        };
        let coverage = rim_coverage(center, radius, support, image.width(), image.height());
        if support > params.accumulator_threshold && coverage >= params.min_rim_coverage {
            log::debug!(
                "hough: circle at ({:.1}, {:.1}) r={radius:.1} votes={} support={support} coverage={coverage:.2}",
                center.x,
                center.y,
                candidate.votes
            );
            circles.push(Circle {
                center,
                radius,
                support,
            });
        }
    }
    HoughResult {
        circles,
        edge_pixel_count,
    }
}

/// Vote grid over candidate centers.
struct Accumulator {
    width: usize,
    height: usize,
    votes: Vec<u32>,
}

impl Accumulator {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn vote(points: &[EdgePoint], image_width: u32, image_height: u32, params: &HoughParams) -> Self {
        let dp = params.resolution_ratio;
        let width = (f64::from(image_width) / dp).ceil() as usize + 2;
        let height = (f64::from(image_height) / dp).ceil() as usize + 2;
        let mut votes = vec![0_u32; width * height];

        let (w, h) = (f64::from(image_width), f64::from(image_height));
        let min_r = f64::from(params.min_radius);
        let max_r = f64::from(params.max_radius);
        for p in points {
            let norm = f64::from(p.gx).hypot(f64::from(p.gy));
            let (ux, uy) = (f64::from(p.gx) / norm, f64::from(p.gy) / norm);
            let (px, py) = (f64::from(p.x) + 0.5, f64::from(p.y) + 0.5);
            for sign in [1.0, -1.0] {
                let mut r = min_r;
                while r <= max_r {
                    let cx = (sign * ux).mul_add(r, px);
                    let cy = (sign * uy).mul_add(r, py);
                    if cx < 0.0 || cy < 0.0 || cx >= w || cy >= h {
                        break;
                    }
                    let col = (cx / dp) as usize;
                    let row = (cy / dp) as usize;
                    votes[row * width + col] += 1;
                    r += dp;
                }
            }
        }
        Self {
            width,
            height,
            votes,
        }
    }

    /// Local maxima above `threshold`, most votes first.
    ///
    /// A cell must strictly beat its left and upper neighbors and at least
    /// match its right and lower ones, so a plateau yields one candidate.
    fn candidates(&self, threshold: u32) -> Vec<Candidate> {
        let mut out = Vec::new();
        if self.width < 3 || self.height < 3 {
            return out;
        }
        let at = |col: usize, row: usize| self.votes[row * self.width + col];
        for row in 1..self.height - 1 {
            for col in 1..self.width - 1 {
                let v = at(col, row);
                if v > threshold
                    && v > at(col - 1, row)
                    && v >= at(col + 1, row)
                    && v > at(col, row - 1)
                    && v >= at(col, row + 1)
                {
                    out.push(Candidate {
                        col,
                        row,
                        votes: v,
                    });
                }
            }
        }
        out.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then(a.row.cmp(&b.row))
                .then(a.col.cmp(&b.col))
        });
        out
    }
}

/// Find the best-supported radius around `center`.
///
/// Windows are ranked by edge pixels per unit radius. Returns the mean
/// distance of the edge pixels in the best three-bin window together with
/// their count, or `None` if no edge pixel lies in the radius range. On
/// equal ratios the larger radius wins.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn estimate_radius(
    center: Point,
    points: &[EdgePoint],
    params: &HoughParams,
    image_width: u32,
    image_height: u32,
) -> Option<(f64, u32)> {
    let diagonal = f64::from(image_width).hypot(f64::from(image_height)).ceil();
    let min_radius = f64::from(params.min_radius);
    let max_radius = f64::from(params.max_radius).min(diagonal);
    if max_radius < min_radius {
        return None;
    }
    let (min_r, max_r) = (min_radius as usize, max_radius as usize);
    // One spare bin either side of the range keeps the window in bounds.
    let mut counts = vec![0_u32; max_r + 2];
    let mut sums = vec![0.0_f64; max_r + 2];
    for p in points {
        let d = center.distance(Point::new(f64::from(p.x) + 0.5, f64::from(p.y) + 0.5));
        if d < min_radius || d > max_radius {
            continue;
        }
        let bin = d as usize;
        counts[bin] += 1;
        sums[bin] += d;
    }

    // (support, mean radius) of the best window so far.
    let mut best: Option<(u32, f64)> = None;
    for bin in min_r..=max_r {
        let window = counts[bin - 1] + counts[bin] + counts[bin + 1];
        if window == 0 {
            continue;
        }
        let radius = (sums[bin - 1] + sums[bin] + sums[bin + 1]) / f64::from(window);
        // window / radius >= count / r, without dividing.
        if best.is_none_or(|(count, r)| f64::from(window) * r >= f64::from(count) * radius) {
            best = Some((window, radius));
        }
    }
    best.map(|(support, radius)| (radius, support))
}

/// Number of angle samples used to measure the visible circumference.
const RIM_SAMPLES: u32 = 360;

/// Ratio of `support` to the length of the circle's circumference that
/// lies inside the image, or `0.0` when none of it does.
fn rim_coverage(center: Point, radius: f64, support: u32, image_width: u32, image_height: u32) -> f64 {
    let (w, h) = (f64::from(image_width), f64::from(image_height));
    let step = std::f64::consts::TAU / f64::from(RIM_SAMPLES);
    let inside = (0..RIM_SAMPLES)
        .filter(|&i| {
            let (sin, cos) = (f64::from(i) * step).sin_cos();
            let x = radius.mul_add(cos, center.x);
            let y = radius.mul_add(sin, center.y);
            (0.0..w).contains(&x) && (0.0..h).contains(&y)
        })
        .count();
    if inside == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let visible = radius * step * inside as f64;
    f64::from(support) / visible
}
