use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

use super::{BoundingBox, Point2, Rect};

const MAX_SUBDIVISION_DEPTH: u32 = 16;

/// Cubic bezier segment given by its four control points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BezierSegment {
    pub p0: Point2,
    pub p1: Point2,
    pub p2: Point2,
    pub p3: Point2,
}

impl BezierSegment {
    pub fn new(p0: Point2, p1: Point2, p2: Point2, p3: Point2) -> Self {
        BezierSegment { p0, p1, p2, p3 }
    }

    /// A straight segment with its control points at the thirds.
    pub fn line(start: Point2, end: Point2) -> Self {
        BezierSegment {
            p0: start,
            p1: start.lerp(end, 1.0 / 3.0),
            p2: start.lerp(end, 2.0 / 3.0),
            p3: end,
        }
    }

    pub fn points(&self) -> [Point2; 4] {
        [self.p0, self.p1, self.p2, self.p3]
    }

    pub fn start(&self) -> Point2 {
        self.p0
    }

    pub fn end(&self) -> Point2 {
        self.p3
    }

    pub fn reversed(&self) -> Self {
        BezierSegment {
            p0: self.p3,
            p1: self.p2,
            p2: self.p1,
            p3: self.p0,
        }
    }

    pub fn translated(&self, delta: Point2) -> Self {
        BezierSegment {
            p0: self.p0 + delta,
            p1: self.p1 + delta,
            p2: self.p2 + delta,
            p3: self.p3 + delta,
        }
    }

    pub fn point_at(&self, t: f64) -> Point2 {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        self.p0 * (u * u * u) + self.p1 * (3.0 * u * u * t) + self.p2 * (3.0 * u * t * t) + self.p3 * (t * t * t)
    }

    pub fn derivative_at(&self, t: f64) -> Point2 {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        ((self.p1 - self.p0) * (u * u) + (self.p2 - self.p1) * (2.0 * u * t) + (self.p3 - self.p2) * (t * t)) * 3.0
    }

    /// Unit tangent at `t`. Where the derivative vanishes (coincident control
    /// points) the direction falls back to the next distinct control point.
    pub fn tangent_at(&self, t: f64) -> Result<Point2, GeometryError> {
        let derivative = self.derivative_at(t);
        if derivative.magnitude() > f64::EPSILON {
            return derivative.normalized();
        }
        let fallbacks = if t <= 0.5 {
            [self.p2 - self.p0, self.p3 - self.p0]
        } else {
            [self.p3 - self.p1, self.p3 - self.p0]
        };
        fallbacks
            .iter()
            .find(|v| v.magnitude() > f64::EPSILON)
            .ok_or(GeometryError::ZeroLength)?
            .normalized()
    }

    /// Unit left-hand normal at `t`.
    pub fn normal_at(&self, t: f64) -> Result<Point2, GeometryError> {
        Ok(self.tangent_at(t)?.perpendicular())
    }

    pub fn split_at(&self, t: f64) -> (BezierSegment, BezierSegment) {
        let t = t.clamp(0.0, 1.0);
        let a = self.p0.lerp(self.p1, t);
        let b = self.p1.lerp(self.p2, t);
        let c = self.p2.lerp(self.p3, t);
        let d = a.lerp(b, t);
        let e = b.lerp(c, t);
        let f = d.lerp(e, t);
        (BezierSegment::new(self.p0, a, d, f), BezierSegment::new(f, e, c, self.p3))
    }

    /// Largest distance of the inner control points from the chord.
    pub fn flatness(&self) -> f64 {
        let chord = self.p3 - self.p0;
        let length = chord.magnitude();
        if length <= f64::EPSILON {
            return self.p0.distance(self.p1).max(self.p0.distance(self.p2));
        }
        let d1 = chord.cross(self.p1 - self.p0).abs() / length;
        let d2 = chord.cross(self.p2 - self.p0).abs() / length;
        d1.max(d2)
    }

    fn control_polygon_length(&self) -> f64 {
        self.p0.distance(self.p1) + self.p1.distance(self.p2) + self.p2.distance(self.p3)
    }

    pub fn length(&self) -> f64 {
        let tolerance = (self.control_polygon_length() * 1e-9).max(f64::EPSILON);
        self.length_within(tolerance, 0)
    }

    fn length_within(&self, tolerance: f64, depth: u32) -> f64 {
        let polygon = self.control_polygon_length();
        let chord = self.p0.distance(self.p3);
        if polygon - chord <= tolerance || depth >= 2 * MAX_SUBDIVISION_DEPTH {
            return (polygon + chord) / 2.0;
        }
        let (left, right) = self.split_at(0.5);
        left.length_within(tolerance / 2.0, depth + 1) + right.length_within(tolerance / 2.0, depth + 1)
    }

    /// Polyline approximation whose deviation from the curve is at most `tolerance`.
    pub fn flatten(&self, tolerance: f64) -> Vec<Point2> {
        let mut points = vec![self.p0];
        self.flatten_into(tolerance, &mut points);
        points
    }

    /// Appends the flattened curve to `out`, excluding the start point.
    pub fn flatten_into(&self, tolerance: f64, out: &mut Vec<Point2>) {
        self.flatten_recursive(tolerance.max(f64::EPSILON), 0, out);
    }

    fn flatten_recursive(&self, tolerance: f64, depth: u32, out: &mut Vec<Point2>) {
        if self.flatness() <= tolerance || depth >= MAX_SUBDIVISION_DEPTH {
            out.push(self.p3);
            return;
        }
        let (left, right) = self.split_at(0.5);
        left.flatten_recursive(tolerance, depth + 1, out);
        right.flatten_recursive(tolerance, depth + 1, out);
    }

    /// Approximate parallel curve at signed distance `distance` (positive to
    /// the left). Endpoints lie exactly on the true offset and the end
    /// tangents are kept, so offsetting a C1 chain keeps it continuous.
    pub fn offset(&self, distance: f64) -> Result<BezierSegment, GeometryError> {
        if !distance.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        let start_shift = self.normal_at(0.0)? * distance;
        let end_shift = self.normal_at(1.0)? * distance;
        Ok(BezierSegment {
            p0: self.p0 + start_shift,
            p1: self.p1 + start_shift,
            p2: self.p2 + end_shift,
            p3: self.p3 + end_shift,
        })
    }

    /// Parameter and distance of the point on the curve closest to `point`,
    /// found by refining a uniform search four times.
    pub fn closest_time_distance(&self, point: Point2, steps: usize) -> (f64, f64) {
        let steps = steps.max(1);
        let (mut t, mut delta_t) = (0.5, 0.5);
        let mut distance = f64::INFINITY;
        for _ in 0..4 {
            let t0 = t - delta_t;
            let step = 2.0 * delta_t / steps as f64;
            let mut closest = (t, f64::INFINITY);
            for n in 0..=steps {
                let candidate = (t0 + n as f64 * step).clamp(0.0, 1.0);
                let d = self.point_at(candidate).distance(point);
                if d < closest.1 {
                    closest = (candidate, d);
                }
            }
            (t, distance) = closest;
            delta_t = step;
            if distance == 0.0 {
                break;
            }
        }
        (t, distance)
    }
}

impl BoundingBox for BezierSegment {
    /// Bounds of the control polygon, which contain the curve.
    fn bounds(&self) -> Rect {
        Rect::new(self.p0, self.p3).including(self.p1).including(self.p2)
    }
}

pub fn bezier_offset(segment: &BezierSegment, distance: f64) -> Result<BezierSegment, GeometryError> {
    segment.offset(distance)
}

/// Connect `a` and `b` with arms of a third of their distance, leaving `a`
/// at `start_angle` and arriving at `b` along `end_angle` (defaults to the
/// start angle). `None` when the points coincide.
pub fn bezier_connect(a: Point2, b: Point2, start_angle: f64, end_angle: Option<f64>) -> Option<BezierSegment> {
    let d = a.distance(b);
    if d == 0.0 {
        return None;
    }
    let end_angle = end_angle.unwrap_or(start_angle);
    Some(BezierSegment::new(
        a,
        a + Point2::from_angle(start_angle) * (d / 3.0),
        b - Point2::from_angle(end_angle) * (d / 3.0),
        b,
    ))
}

/// Smoothly join the end `e0` of one path leaving at angle `a0` to the start
/// `e1` of another arriving at angle `a1`.
pub fn smooth_join(e0: Point2, a0: f64, a1: f64, e1: Point2) -> BezierSegment {
    let d = e0.distance(e1) / 3.0;
    BezierSegment::new(e0, e0 + Point2::from_angle(a0) * d, e1 - Point2::from_angle(a1) * d, e1)
}

pub fn chain_length(segments: &[BezierSegment]) -> f64 {
    segments.iter().map(BezierSegment::length).sum()
}

/// Index and size of the first gap larger than `epsilon` between consecutive segments.
pub fn first_gap(segments: &[BezierSegment], epsilon: f64) -> Option<(usize, f64)> {
    segments.windows(2).enumerate().find_map(|(index, pair)| {
        let gap = pair[0].end().distance(pair[1].start());
        (gap > epsilon).then_some((index, gap))
    })
}

/// Split a bezier chain at the point on it closest to `point`.
pub fn split_chain_at_point(segments: &[BezierSegment], point: Point2) -> (Vec<BezierSegment>, Vec<BezierSegment>) {
    let mut closest: Option<(usize, f64, f64)> = None;
    for (index, segment) in segments.iter().enumerate() {
        let (t, distance) = segment.closest_time_distance(point, 10);
        if closest.map_or(true, |(_, _, best)| distance < best) {
            closest = Some((index, t, distance));
            if distance == 0.0 {
                break;
            }
        }
    }
    match closest {
        Some((index, t, _)) if !(index + 1 == segments.len() && t >= 1.0) => {
            let (head, tail) = segments[index].split_at(t);
            let mut before = segments[..index].to_vec();
            before.push(head);
            let mut after = vec![tail];
            after.extend_from_slice(&segments[index + 1..]);
            (before, after)
        }
        _ => (segments.to_vec(), Vec::new()),
    }
}
