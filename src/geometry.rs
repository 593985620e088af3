use std::cmp::Ordering;

use imageproc::point::Point;
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};

use crate::error::CardError;

/// A detected card boundary: four unordered vertices and the area of the
/// contour they were approximated from.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadrilateral {
    pub points: [Point2<f64>; 4],
    pub area: f64,
}

impl Quadrilateral {
    pub fn new(points: [Point2<f64>; 4], area: f64) -> Self {
        Self { points, area }
    }

    /// Build a quad from its vertices alone, using the polygon area.
    pub fn from_points(points: [Point2<f64>; 4]) -> Self {
        let area = shoelace(&points).abs();
        Self { points, area }
    }

    /// Mean of the four vertices.
    pub fn centroid(&self) -> Point2<f64> {
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point2::new(sx / 4.0, sy / 4.0)
    }
}

/// Corners labelled top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedQuad {
    pub tl: Point2<f64>,
    pub tr: Point2<f64>,
    pub br: Point2<f64>,
    pub bl: Point2<f64>,
}

impl OrderedQuad {
    pub fn new(tl: Point2<f64>, tr: Point2<f64>, br: Point2<f64>, bl: Point2<f64>) -> Self {
        Self { tl, tr, br, bl }
    }

    pub fn corners(&self) -> [Point2<f64>; 4] {
        [self.tl, self.tr, self.br, self.bl]
    }

    /// Width and height of the rectangle this quad rectifies to: the longer
    /// edge of each opposing pair, rounded.
    pub fn rectified_size(&self) -> (u32, u32) {
        let width =
            nalgebra::distance(&self.br, &self.bl).max(nalgebra::distance(&self.tr, &self.tl));
        let height =
            nalgebra::distance(&self.tr, &self.br).max(nalgebra::distance(&self.tl, &self.bl));
        (width.round() as u32, height.round() as u32)
    }
}

/// A circle in card pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point2<f64>,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point2<f64>, radius: f64) -> Self {
        Self { center, radius }
    }

    fn contains(&self, p: &Point2<f64>) -> bool {
        nalgebra::distance(&self.center, p) <= self.radius * (1.0 + 1e-9) + 1e-9
    }
}

/// Label four points TL/TR/BR/BL with the sum/difference rule.
///
/// TL has the smallest `x + y`, BR the largest; TR has the smallest `y - x`,
/// BL the largest. This is only correct for convex quads rotated at most 45°
/// from the image axes. Ties are broken on the coordinates so the result does
/// not depend on input order. A point picked for two labels is rejected.
pub fn order_corners(points: &[Point2<f64>; 4]) -> Result<OrderedQuad, CardError> {
    let sum: fn(&Point2<f64>) -> f64 = |p| p.x + p.y;
    let diff: fn(&Point2<f64>) -> f64 = |p| p.y - p.x;

    // The iterators are never empty.
    let tl = *points.iter().min_by(by_key(sum)).unwrap_or(&points[0]);
    let br = *points.iter().max_by(by_key(sum)).unwrap_or(&points[0]);
    let tr = *points.iter().min_by(by_key(diff)).unwrap_or(&points[0]);
    let bl = *points.iter().max_by(by_key(diff)).unwrap_or(&points[0]);

    let ordered = OrderedQuad::new(tl, tr, br, bl);
    let corners = ordered.corners();
    for i in 0..4 {
        for j in (i + 1)..4 {
            if corners[i] == corners[j] {
                return Err(CardError::degenerate(format!(
                    "corner ({:.1}, {:.1}) matched two labels",
                    corners[i].x, corners[i].y
                )));
            }
        }
    }
    Ok(ordered)
}

fn by_key(
    key: fn(&Point2<f64>) -> f64,
) -> impl Fn(&&Point2<f64>, &&Point2<f64>) -> Ordering {
    move |a, b| {
        key(a)
            .total_cmp(&key(b))
            .then(a.x.total_cmp(&b.x))
            .then(a.y.total_cmp(&b.y))
    }
}

/// True when any three of the four corners lie on one line.
pub fn has_collinear_corners(corners: &[Point2<f64>; 4]) -> bool {
    let scale = corners
        .iter()
        .flat_map(|p| [p.x.abs(), p.y.abs()])
        .fold(1.0_f64, f64::max);
    let tolerance = 1e-9 * scale * scale;

    (0..4).any(|skip| {
        let [a, b, c]: [Point2<f64>; 3] = match skip {
            0 => [corners[1], corners[2], corners[3]],
            1 => [corners[0], corners[2], corners[3]],
            2 => [corners[0], corners[1], corners[3]],
            _ => [corners[0], corners[1], corners[2]],
        };
        let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
        cross.abs() <= tolerance
    })
}

/// Solve the projective transform taking `src[i]` to `dst[i]`.
///
/// Eight unknowns with h33 = 1, two equations per correspondence.
pub fn perspective_transform(
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = (src[k].x, src[k].y);
        let (u, v) = (dst[k].x, dst[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let matrix = Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], 1.0,
    );
    if matrix.determinant().abs() < 1e-12 {
        return None;
    }
    Some(matrix)
}

/// Transform a point using a homogeneous 3x3 matrix
pub fn transform_point(matrix: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = Vector3::new(x, y, 1.0);
    let result = matrix * p;
    (result.x / result.z, result.y / result.z)
}

/// Signed shoelace sum over a closed polygon (positive for counter-clockwise
/// in a y-up frame).
fn shoelace(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let p = points[i];
            let q = points[(i + 1) % n];
            p.x * q.y - q.x * p.y
        })
        .sum();
    twice / 2.0
}

pub fn to_point2(p: &Point<i32>) -> Point2<f64> {
    Point2::new(p.x as f64, p.y as f64)
}

/// Area enclosed by a contour.
pub fn contour_area(contour: &[Point<i32>]) -> f64 {
    let points: Vec<Point2<f64>> = contour.iter().map(to_point2).collect();
    shoelace(&points).abs()
}

/// Area-weighted centroid of a contour, or the vertex mean when it encloses
/// no area.
pub fn contour_centroid(contour: &[Point<i32>]) -> Option<Point2<f64>> {
    if contour.is_empty() {
        return None;
    }
    let points: Vec<Point2<f64>> = contour.iter().map(to_point2).collect();
    let area = shoelace(&points);
    if area.abs() < 1e-9 {
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        return Some(Point2::new(sx / n, sy / n));
    }

    let n = points.len();
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        let cross = p.x * q.y - q.x * p.y;
        cx += (p.x + q.x) * cross;
        cy += (p.y + q.y) * cross;
    }
    Some(Point2::new(cx / (6.0 * area), cy / (6.0 * area)))
}

/// Smallest circle containing every point (incremental Welzl).
pub fn min_enclosing_circle(points: &[Point2<f64>]) -> Option<Circle> {
    let first = *points.first()?;
    let mut pts = points.to_vec();
    shuffle(&mut pts);

    let mut circle = Circle::new(first, 0.0);
    for i in 0..pts.len() {
        if circle.contains(&pts[i]) {
            continue;
        }
        circle = Circle::new(pts[i], 0.0);
        for j in 0..i {
            if circle.contains(&pts[j]) {
                continue;
            }
            circle = circle_from_two(&pts[i], &pts[j]);
            for k in 0..j {
                if !circle.contains(&pts[k]) {
                    circle = circle_from_three(&pts[i], &pts[j], &pts[k]);
                }
            }
        }
    }
    Some(circle)
}

fn circle_from_two(a: &Point2<f64>, b: &Point2<f64>) -> Circle {
    let center = nalgebra::center(a, b);
    Circle::new(center, nalgebra::distance(a, b) / 2.0)
}

fn circle_from_three(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> Circle {
    let (bx, by) = (b.x - a.x, b.y - a.y);
    let (cx, cy) = (c.x - a.x, c.y - a.y);
    let d = 2.0 * (bx * cy - by * cx);

    if d.abs() < 1e-12 {
        // Collinear: the two farthest points span the circle.
        return [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)]
            .into_iter()
            .max_by(|p, q| p.radius.total_cmp(&q.radius))
            .unwrap_or_else(|| circle_from_two(a, b));
    }

    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (cy * b2 - by * c2) / d;
    let uy = (bx * c2 - cx * b2) / d;
    let center = Point2::new(a.x + ux, a.y + uy);
    Circle::new(center, (ux * ux + uy * uy).sqrt())
}

/// Fisher-Yates with a fixed xorshift seed, so results are reproducible.
fn shuffle(points: &mut [Point2<f64>]) {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    for i in (1..points.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        points.swap(i, j);
    }
}
