//! Gradient Hough transform for circles.
//!
//! Every edge pixel votes for the centers lying along its gradient direction
//! within the radius range. Votes for one center scatter over a few cells, so
//! peaks are taken on a box-summed accumulator. Each surviving center gets the
//! radius best supported by the edge pixels around it.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use nalgebra::Point2;
use tracing::debug;

use crate::geometry::Circle;

/// Parameters of one accumulator pass, in pixels.
#[derive(Debug, Clone)]
pub struct CircleSearch {
    pub min_radius: u32,
    pub max_radius: u32,
    pub min_center_distance: f64,
    pub canny_high: f32,
    pub vote_threshold: u32,
    pub min_support: f64,
}

/// A circle together with the evidence behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughCircle {
    pub circle: Circle,
    pub votes: u32,
    /// Fraction of the circumference covered by edge pixels.
    pub support: f64,
}

const RADIUS_WINDOW: i64 = 2;
/// Half-size of the box that votes are pooled over before peak picking.
const PEAK_WINDOW: i64 = 2;
/// Vote directions are taken from a smoothed copy of the image.
const GRADIENT_SIGMA: f32 = 2.0;

pub fn detect_circles(gray: &GrayImage, search: &CircleSearch) -> Vec<HoughCircle> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 || search.max_radius < search.min_radius {
        return Vec::new();
    }

    let edges = canny(gray, search.canny_high / 2.0, search.canny_high);
    let smoothed = gaussian_blur_f32(gray, GRADIENT_SIGMA);
    let gx = horizontal_sobel(&smoothed);
    let gy = vertical_sobel(&smoothed);

    let mut edge_points = Vec::new();
    let mut accumulator = vec![0u32; (width * height) as usize];

    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        let dx = gx.get_pixel(x, y)[0] as f64;
        let dy = gy.get_pixel(x, y)[0] as f64;
        let magnitude = dx.hypot(dy);
        if magnitude < 1.0 {
            continue;
        }
        edge_points.push(Point2::new(x as f64, y as f64));

        let (ux, uy) = (dx / magnitude, dy / magnitude);
        for sign in [-1.0, 1.0] {
            for r in search.min_radius..=search.max_radius {
                let cx = (x as f64 + sign * ux * r as f64).round();
                let cy = (y as f64 + sign * uy * r as f64).round();
                if cx < 0.0 || cy < 0.0 || cx >= width as f64 || cy >= height as f64 {
                    break;
                }
                accumulator[(cy as u32 * width + cx as u32) as usize] += 1;
            }
        }
    }

    let centers = find_centers(&accumulator, width, height, search);
    debug!(
        edge_points = edge_points.len(),
        centers = centers.len(),
        "circle accumulator filled"
    );

    centers
        .into_iter()
        .filter_map(|(center, votes)| {
            let (radius, support) = estimate_radius(&center, &edge_points, search)?;
            Some(HoughCircle {
                circle: Circle::new(center, radius),
                votes,
                support,
            })
        })
        .collect()
}

/// Sum of every `(2 * radius + 1)` square window, zero outside the image.
fn box_sum(values: &[u32], width: u32, height: u32, radius: i64) -> Vec<u32> {
    let (w, h) = (width as i64, height as i64);
    let mut rows = vec![0u32; values.len()];
    for y in 0..h {
        for x in 0..w {
            rows[(y * w + x) as usize] = ((x - radius).max(0)..=(x + radius).min(w - 1))
                .map(|nx| values[(y * w + nx) as usize])
                .sum();
        }
    }
    let mut out = vec![0u32; values.len()];
    for y in 0..h {
        for x in 0..w {
            out[(y * w + x) as usize] = ((y - radius).max(0)..=(y + radius).min(h - 1))
                .map(|ny| rows[(ny * w + x) as usize])
                .sum();
        }
    }
    out
}

fn cell_reader(values: &[u32], width: u32, height: u32) -> impl Fn(i64, i64) -> u32 + '_ {
    move |x, y| {
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            0
        } else {
            values[(y as u32 * width + x as u32) as usize]
        }
    }
}

/// Local maxima of the pooled votes above the vote threshold, strongest
/// first, kept only when far enough from every stronger center.
fn find_centers(
    accumulator: &[u32],
    width: u32,
    height: u32,
    search: &CircleSearch,
) -> Vec<(Point2<f64>, u32)> {
    let pooled = box_sum(accumulator, width, height, PEAK_WINDOW);
    let at = cell_reader(&pooled, width, height);
    let raw = cell_reader(accumulator, width, height);

    let mut peaks = Vec::new();
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let votes = at(x, y);
            if votes <= search.vote_threshold {
                continue;
            }
            let is_peak = (-1..=1).all(|dy| {
                (-1..=1).all(|dx| {
                    let n = at(x + dx, y + dy);
                    // Plateaus keep their first cell in raster order.
                    n < votes || (n == votes && (dy, dx) >= (0, 0))
                })
            });
            if is_peak {
                peaks.push((x, y, votes));
            }
        }
    }
    peaks.sort_by(|a, b| b.2.cmp(&a.2).then((a.1, a.0).cmp(&(b.1, b.0))));

    let mut centers: Vec<(Point2<f64>, u32)> = Vec::new();
    for (x, y, votes) in peaks {
        let center = refine_center(x, y, &raw);
        if centers
            .iter()
            .all(|(c, _)| nalgebra::distance(c, &center) >= search.min_center_distance)
        {
            centers.push((center, votes));
        }
    }
    centers
}

/// Vote-weighted mean of the raw cells around a peak.
fn refine_center(x: i64, y: i64, at: &impl Fn(i64, i64) -> u32) -> Point2<f64> {
    let (mut sx, mut sy, mut total) = (0.0, 0.0, 0.0);
    for dy in -PEAK_WINDOW..=PEAK_WINDOW {
        for dx in -PEAK_WINDOW..=PEAK_WINDOW {
            let w = at(x + dx, y + dy) as f64;
            sx += w * (x + dx) as f64;
            sy += w * (y + dy) as f64;
            total += w;
        }
    }
    if total > 0.0 {
        Point2::new(sx / total, sy / total)
    } else {
        Point2::new(x as f64, y as f64)
    }
}

/// Radius with the best circumference coverage, refined by the mean distance
/// of the edge pixels that voted for it.
fn estimate_radius(
    center: &Point2<f64>,
    edge_points: &[Point2<f64>],
    search: &CircleSearch,
) -> Option<(f64, f64)> {
    let max_bin = search.max_radius as i64 + RADIUS_WINDOW;
    let mut histogram = vec![0u32; (max_bin + 1) as usize];
    for p in edge_points {
        let d = nalgebra::distance(center, p).round() as i64;
        if d <= max_bin {
            histogram[d as usize] += 1;
        }
    }

    let mut best: Option<(i64, f64)> = None;
    for r in search.min_radius as i64..=search.max_radius as i64 {
        if r == 0 {
            continue;
        }
        let lo = (r - RADIUS_WINDOW).max(0) as usize;
        let hi = (r + RADIUS_WINDOW) as usize;
        let count: u32 = histogram[lo..=hi].iter().sum();
        let support = count as f64 / (2.0 * std::f64::consts::PI * r as f64);
        if best.map_or(true, |(_, s)| support > s) {
            best = Some((r, support));
        }
    }

    let (r, support) = best?;
    if support < search.min_support {
        return None;
    }

    let (sum, n) = edge_points
        .iter()
        .map(|p| nalgebra::distance(center, p))
        .filter(|d| (d - r as f64).abs() <= RADIUS_WINDOW as f64 + 0.5)
        .fold((0.0, 0usize), |(sum, n), d| (sum + d, n + 1));
    let radius = if n > 0 { sum / n as f64 } else { r as f64 };
    Some((radius, support.min(1.0)))
}
