use image::{GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use nalgebra::Point2;
use tracing::{debug, warn};

use crate::config::{sigma_for_kernel, DetectionConfig};
use crate::error::PipelineError;
use crate::geometry::{contour_area, to_point2, Quadrilateral};

/// How confidently the selector filled the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStatus {
    /// The detector produced exactly as many candidates as the grid has cells.
    Exact,
    /// Candidate count differed; the largest ones were kept.
    BestEffort { candidates: usize },
}

/// Quads picked for the grid and how they were picked.
#[derive(Debug, Clone)]
pub struct Selection {
    pub quads: Vec<Quadrilateral>,
    pub status: SelectionStatus,
}

/// Convert to grayscale, smooth and run Canny.
pub fn edge_map(img: &RgbImage, config: &DetectionConfig) -> GrayImage {
    let gray = image::imageops::grayscale(img);
    let blurred = gaussian_blur_f32(&gray, sigma_for_kernel(config.blur_kernel_size));
    canny(&blurred, config.canny_low, config.canny_high)
}

/// Outer borders that are not nested inside another border.
pub fn external_contours(binary: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .collect()
}

/// Douglas-Peucker approximation of a closed contour.
///
/// The contour is cut at two mutually distant points, found as the point
/// farthest from the first one and then the point farthest from that. Each
/// arc is simplified as an open curve and both cut points stay vertices. For
/// a card outline they are diagonal corners, so no vertex lands on the seam of
/// the traced border.
pub fn approximate_closed_polygon(contour: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if contour.len() < 3 || epsilon <= 0.0 {
        return contour.to_vec();
    }
    let far = farthest_from(contour, contour[0]);
    let opposite = farthest_from(contour, contour[far]);
    if far == opposite {
        return vec![contour[far]];
    }
    let (a, b) = (far.min(opposite), far.max(opposite));

    let head = &contour[a..=b];
    let mut tail: Vec<Point<i32>> = contour[b..].to_vec();
    tail.extend_from_slice(&contour[..=a]);

    let mut polygon = approximate_polygon_dp(head, epsilon, false);
    let rest = approximate_polygon_dp(&tail, epsilon, false);
    // Both arcs share their end points.
    polygon.extend(rest.iter().skip(1).take(rest.len().saturating_sub(2)));
    polygon
}

fn farthest_from(contour: &[Point<i32>], origin: Point<i32>) -> usize {
    contour
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| {
            let (dx, dy) = ((p.x - origin.x) as i64, (p.y - origin.y) as i64);
            dx * dx + dy * dy
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Find every quadrilateral outline in the image that is large enough to be a card.
pub fn detect_candidates(img: &RgbImage, config: &DetectionConfig) -> Vec<Quadrilateral> {
    let (width, height) = img.dimensions();
    let min_area = config.min_area_fraction * width as f64 * height as f64;

    let edges = edge_map(img, config);
    let contours = external_contours(&edges);
    debug!(contours = contours.len(), "extracted external contours");

    let candidates: Vec<Quadrilateral> = contours
        .iter()
        .filter_map(|contour| {
            let perimeter = arc_length(&contour.points, true);
            let polygon =
                approximate_closed_polygon(&contour.points, config.epsilon_fraction * perimeter);
            if polygon.len() != 4 {
                return None;
            }
            let area = contour_area(&contour.points);
            if area <= min_area {
                return None;
            }
            let points: [Point2<f64>; 4] = [
                to_point2(&polygon[0]),
                to_point2(&polygon[1]),
                to_point2(&polygon[2]),
                to_point2(&polygon[3]),
            ];
            Some(Quadrilateral::new(points, area))
        })
        .collect();

    debug!(
        candidates = candidates.len(),
        min_area, "filtered quadrilateral candidates"
    );
    candidates
}

/// Reduce the candidates to exactly `required` quads.
///
/// An exact count is accepted untouched. Otherwise the `required` largest by
/// area are kept, which fails only when there are not enough of them.
pub fn select_quads(
    mut candidates: Vec<Quadrilateral>,
    required: usize,
) -> Result<Selection, PipelineError> {
    let found = candidates.len();
    if found == required {
        return Ok(Selection {
            quads: candidates,
            status: SelectionStatus::Exact,
        });
    }

    warn!(found, required, "card count mismatch, keeping the largest candidates");
    if found < required {
        return Err(PipelineError::InsufficientDetections { found, required });
    }

    candidates.sort_by(|a, b| b.area.total_cmp(&a.area));
    candidates.truncate(required);
    Ok(Selection {
        quads: candidates,
        status: SelectionStatus::BestEffort { candidates: found },
    })
}
