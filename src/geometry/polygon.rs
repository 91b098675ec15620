use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

use super::{BoundingBox, Point2, Rect};

/// A simple polygon with optional holes. Rings are implicitly closed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point2>,
    #[serde(default)]
    pub holes: Vec<Vec<Point2>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point2>) -> Self {
        Polygon {
            exterior,
            holes: Vec::new(),
        }
    }

    pub fn with_holes(exterior: Vec<Point2>, holes: Vec<Vec<Point2>>) -> Self {
        Polygon { exterior, holes }
    }

    pub fn rect(rect: &Rect) -> Self {
        Polygon::new(vec![
            rect.min,
            Point2::new(rect.max.x, rect.min.y),
            rect.max,
            Point2::new(rect.min.x, rect.max.y),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.exterior.is_empty()
    }

    pub fn rings(&self) -> impl Iterator<Item = &[Point2]> {
        std::iter::once(self.exterior.as_slice()).chain(self.holes.iter().map(Vec::as_slice))
    }

    pub fn edges(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
        self.rings().flat_map(ring_edges)
    }

    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|hole| signed_area(hole).abs()).sum();
        (signed_area(&self.exterior).abs() - holes).max(0.0)
    }

    /// Area weighted centroid; rings without area fall back to the mean of
    /// their vertices.
    pub fn centroid(&self) -> Result<Point2, GeometryError> {
        if self.exterior.is_empty() {
            return Err(GeometryError::EmptyInput);
        }
        let mut weighted = Point2::ORIGIN;
        let mut total = 0.0;
        for (index, ring) in self.rings().enumerate() {
            let (area, moment) = ring_moments(ring);
            let sign = if index == 0 { 1.0 } else { -1.0 };
            let area = sign * area.abs();
            let centroid = if moment.1.abs() > f64::EPSILON { moment.0 / moment.1 } else { continue };
            weighted = weighted + centroid * area;
            total += area;
        }
        if total.abs() > f64::EPSILON {
            return Ok(weighted / total);
        }
        let sum = self.exterior.iter().fold(Point2::ORIGIN, |acc, p| acc + *p);
        Ok(sum / self.exterior.len() as f64)
    }

    /// Even-odd containment over all rings; boundary points count as inside.
    pub fn contains_point(&self, point: Point2) -> bool {
        if self.edges().any(|(a, b)| point_segment_distance(point, a, b) <= f64::EPSILON) {
            return true;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > point.y) != (b.y > point.y) {
                let x = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    pub fn contains_polygon(&self, other: &Polygon) -> bool {
        other.exterior.iter().all(|p| self.contains_point(*p))
    }

    pub fn distance_to_point(&self, point: Point2) -> f64 {
        if self.contains_point(point) {
            return 0.0;
        }
        self.edges()
            .map(|(a, b)| point_segment_distance(point, a, b))
            .fold(f64::INFINITY, f64::min)
    }

    /// Smallest distance between the two outlines, zero when they overlap.
    pub fn distance_to_polygon(&self, other: &Polygon) -> f64 {
        if self.exterior.iter().any(|p| other.contains_point(*p))
            || other.exterior.iter().any(|p| self.contains_point(*p))
        {
            return 0.0;
        }
        let mut best = f64::INFINITY;
        for (a0, a1) in self.edges() {
            for (b0, b1) in other.edges() {
                if segment_intersection(a0, a1, b0, b1).is_some() {
                    return 0.0;
                }
                best = best
                    .min(point_segment_distance(a0, b0, b1))
                    .min(point_segment_distance(a1, b0, b1))
                    .min(point_segment_distance(b0, a0, a1))
                    .min(point_segment_distance(b1, a0, a1));
            }
        }
        best
    }

    /// Parameters along `start -> end` where the segment crosses any ring.
    pub fn segment_crossings(&self, start: Point2, end: Point2) -> Vec<f64> {
        self.edges()
            .filter_map(|(a, b)| segment_intersection(start, end, a, b).map(|(t, _)| t))
            .collect()
    }
}

impl BoundingBox for Polygon {
    fn bounds(&self) -> Rect {
        Rect::from_points(&self.exterior).unwrap_or(Rect::from_point(Point2::ORIGIN))
    }
}

fn ring_edges(ring: &[Point2]) -> impl Iterator<Item = (Point2, Point2)> + '_ {
    let closing = match ring {
        [first, .., last] if first != last => Some((*last, *first)),
        _ => None,
    };
    ring.windows(2).map(|w| (w[0], w[1])).chain(closing)
}

/// Shoelace area, positive for counter-clockwise rings.
pub fn signed_area(ring: &[Point2]) -> f64 {
    ring_edges(ring).map(|(a, b)| a.cross(b)).sum::<f64>() / 2.0
}

// (first moment scaled by 6 * area, 6 * area) so the ratio is the centroid
fn ring_moments(ring: &[Point2]) -> (f64, (Point2, f64)) {
    let mut moment = Point2::ORIGIN;
    let mut twice_area = 0.0;
    for (a, b) in ring_edges(ring) {
        let cross = a.cross(b);
        moment = moment + (a + b) * cross;
        twice_area += cross;
    }
    (twice_area / 2.0, (moment, 3.0 * twice_area))
}

pub fn point_segment_distance(point: Point2, a: Point2, b: Point2) -> f64 {
    let ab = b - a;
    let length_2 = ab.dot(ab);
    if length_2 <= f64::EPSILON {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / length_2).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}

/// Intersection of segments `a0-a1` and `b0-b1` as (parameter along a, point).
/// Collinear overlaps are not reported.
pub fn segment_intersection(a0: Point2, a1: Point2, b0: Point2, b1: Point2) -> Option<(f64, Point2)> {
    let r = a1 - a0;
    let s = b1 - b0;
    let denominator = r.cross(s);
    if denominator.abs() <= f64::EPSILON {
        return None;
    }
    let qp = b0 - a0;
    let t = qp.cross(s) / denominator;
    let u = qp.cross(r) / denominator;
    ((0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)).then(|| (t, a0 + r * t))
}
