use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

use super::{BezierSegment, Point2};

const MAX_ARC_PIECES: usize = 1024;
const ERROR_SAMPLES: usize = 8;
/// Slack on a full turn for sweeps computed as `start + TAU - start`.
const SWEEP_SLACK: f64 = 1e-9;

/// Approximate a circular arc with cubic beziers, one piece per started
/// quarter turn. A quarter circle piece deviates from the true arc by
/// under 0.03% of the radius. Negative sweeps run clockwise; sweeps beyond
/// one full turn are rejected.
pub fn arc_to_bezier(
    center: Point2,
    radius: f64,
    start_angle: f64,
    end_angle: f64,
) -> Result<Vec<BezierSegment>, GeometryError> {
    let sweep = check_arc(center, radius, start_angle, end_angle)?;
    Ok(circular_pieces(center, radius, start_angle, sweep, quarter_pieces(sweep)))
}

/// Like [`arc_to_bezier`] but keeps subdividing until the sampled radial
/// error relative to `radius` is within `tolerance`.
pub fn arc_to_bezier_with_tolerance(
    center: Point2,
    radius: f64,
    start_angle: f64,
    end_angle: f64,
    tolerance: f64,
) -> Result<Vec<BezierSegment>, GeometryError> {
    let sweep = check_arc(center, radius, start_angle, end_angle)?;
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(GeometryError::NonFinite);
    }
    let mut pieces = quarter_pieces(sweep);
    loop {
        let segments = circular_pieces(center, radius, start_angle, sweep, pieces);
        if pieces >= MAX_ARC_PIECES || radial_error(&segments, center, radius) <= tolerance {
            return Ok(segments);
        }
        pieces = (pieces * 2).min(MAX_ARC_PIECES);
    }
}

/// Validate an arc and return its sweep.
fn check_arc(center: Point2, radius: f64, start_angle: f64, end_angle: f64) -> Result<f64, GeometryError> {
    if !radius.is_finite() || radius <= 0.0 {
        return Err(GeometryError::InvalidRadius(radius));
    }
    if !center.is_finite() || !start_angle.is_finite() || !end_angle.is_finite() {
        return Err(GeometryError::NonFinite);
    }
    let sweep = end_angle - start_angle;
    if !sweep.is_finite() {
        return Err(GeometryError::NonFinite);
    }
    if sweep.abs() > TAU + SWEEP_SLACK {
        return Err(GeometryError::SweepTooLarge(sweep));
    }
    Ok(sweep)
}

fn quarter_pieces(sweep: f64) -> usize {
    ((sweep.abs() / FRAC_PI_2).ceil() as usize).clamp(1, MAX_ARC_PIECES)
}

fn circular_pieces(center: Point2, radius: f64, start_angle: f64, sweep: f64, pieces: usize) -> Vec<BezierSegment> {
    let step = sweep / pieces as f64;
    let k = 4.0 / 3.0 * (step / 4.0).tan();
    (0..pieces)
        .map(|i| {
            let a0 = start_angle + step * i as f64;
            let a1 = a0 + step;
            let (u0, u1) = (Point2::from_angle(a0), Point2::from_angle(a1));
            let p0 = center + u0 * radius;
            let p3 = center + u1 * radius;
            BezierSegment::new(
                p0,
                p0 + u0.perpendicular() * (radius * k),
                p3 - u1.perpendicular() * (radius * k),
                p3,
            )
        })
        .collect()
}

/// Largest sampled |distance - radius| / radius over all pieces.
pub(crate) fn radial_error(segments: &[BezierSegment], center: Point2, radius: f64) -> f64 {
    segments
        .iter()
        .flat_map(|segment| {
            (1..ERROR_SAMPLES).map(move |i| {
                let t = i as f64 / ERROR_SAMPLES as f64;
                (segment.point_at(t).distance(center) - radius).abs() / radius
            })
        })
        .fold(0.0, f64::max)
}

/// An SVG style elliptical arc given by its endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipticArc {
    pub start: Point2,
    pub end: Point2,
    pub rx: f64,
    pub ry: f64,
    /// Rotation of the ellipse's x axis, in radians.
    pub x_axis_rotation: f64,
    pub large_arc: bool,
    pub sweep: bool,
}

struct CenterArc {
    center: Point2,
    rx: f64,
    ry: f64,
    cos_phi: f64,
    sin_phi: f64,
    theta: f64,
    delta: f64,
}

impl CenterArc {
    fn point(&self, eta: f64) -> Point2 {
        let (x, y) = (self.rx * eta.cos(), self.ry * eta.sin());
        self.center + Point2::new(self.cos_phi * x - self.sin_phi * y, self.sin_phi * x + self.cos_phi * y)
    }

    fn derivative(&self, eta: f64) -> Point2 {
        let (x, y) = (-self.rx * eta.sin(), self.ry * eta.cos());
        Point2::new(self.cos_phi * x - self.sin_phi * y, self.sin_phi * x + self.cos_phi * y)
    }
}

impl EllipticArc {
    fn to_center(&self) -> Option<CenterArc> {
        let (sin_phi, cos_phi) = self.x_axis_rotation.sin_cos();
        let half = (self.start - self.end) / 2.0;
        let x1 = cos_phi * half.x + sin_phi * half.y;
        let y1 = -sin_phi * half.x + cos_phi * half.y;

        let (mut rx, mut ry) = (self.rx.abs(), self.ry.abs());
        let lambda = (x1 * x1) / (rx * rx) + (y1 * y1) / (ry * ry);
        if lambda > 1.0 {
            rx *= lambda.sqrt();
            ry *= lambda.sqrt();
        }
        let numerator = rx * rx * ry * ry - rx * rx * y1 * y1 - ry * ry * x1 * x1;
        let denominator = rx * rx * y1 * y1 + ry * ry * x1 * x1;
        if denominator <= 0.0 {
            return None;
        }
        let sign = if self.large_arc == self.sweep { -1.0 } else { 1.0 };
        let coef = sign * (numerator / denominator).max(0.0).sqrt();
        let cx1 = coef * rx * y1 / ry;
        let cy1 = -coef * ry * x1 / rx;
        let mid = self.start.midpoint(self.end);
        let center = Point2::new(cos_phi * cx1 - sin_phi * cy1 + mid.x, sin_phi * cx1 + cos_phi * cy1 + mid.y);

        let u = Point2::new((x1 - cx1) / rx, (y1 - cy1) / ry);
        let v = Point2::new((-x1 - cx1) / rx, (-y1 - cy1) / ry);
        let theta = u.angle();
        let mut delta = u.cross(v).atan2(u.dot(v));
        if !self.sweep && delta > 0.0 {
            delta -= TAU;
        } else if self.sweep && delta < 0.0 {
            delta += TAU;
        }
        Some(CenterArc {
            center,
            rx,
            ry,
            cos_phi,
            sin_phi,
            theta,
            delta,
        })
    }
}

/// Convert an elliptical arc into cubic pieces spanning at most 45 degrees
/// of the ellipse's parameter. Zero radii degrade to a straight segment and
/// coincident endpoints produce no segments.
pub fn elliptic_arc_to_bezier(arc: &EllipticArc) -> Result<Vec<BezierSegment>, GeometryError> {
    if !arc.start.is_finite() || !arc.end.is_finite() || !arc.rx.is_finite() || !arc.ry.is_finite() {
        return Err(GeometryError::NonFinite);
    }
    if arc.start == arc.end {
        return Ok(Vec::new());
    }
    if arc.rx == 0.0 || arc.ry == 0.0 {
        return Ok(vec![BezierSegment::line(arc.start, arc.end)]);
    }
    let Some(center_arc) = arc.to_center() else {
        return Ok(vec![BezierSegment::line(arc.start, arc.end)]);
    };
    let pieces = ((center_arc.delta.abs() / FRAC_PI_4).ceil() as usize).max(1);
    let step = center_arc.delta / pieces as f64;
    let alpha = step.sin() * ((4.0 + 3.0 * (step / 2.0).tan().powi(2)).sqrt() - 1.0) / 3.0;

    let mut segments = Vec::with_capacity(pieces);
    let mut eta = center_arc.theta;
    let mut p0 = arc.start;
    for i in 0..pieces {
        let next = eta + step;
        let p3 = if i + 1 == pieces { arc.end } else { center_arc.point(next) };
        segments.push(BezierSegment::new(
            p0,
            p0 + center_arc.derivative(eta) * alpha,
            p3 - center_arc.derivative(next) * alpha,
            p3,
        ));
        eta = next;
        p0 = p3;
    }
    Ok(segments)
}

/// Full circle as four quarter arcs, starting at angle zero.
pub fn circle(center: Point2, radius: f64) -> Result<Vec<BezierSegment>, GeometryError> {
    arc_to_bezier(center, radius, 0.0, 2.0 * PI)
}
