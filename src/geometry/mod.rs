pub mod arc;
pub mod bezier;
pub mod markers;
pub mod polygon;
pub mod search;

use std::ops::{Add, Div, Mul, Neg, Sub};

use rstar::AABB;
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

pub use arc::{arc_to_bezier, arc_to_bezier_with_tolerance, elliptic_arc_to_bezier, EllipticArc};
pub use bezier::{bezier_connect, bezier_offset, smooth_join, BezierSegment};
pub use polygon::Polygon;
pub use search::{nearest_feature, FeatureIndex};

pub trait PointLike {
    fn x(&self) -> f64;
    fn y(&self) -> f64;

    fn as_point(&self) -> Point2 {
        Point2 {
            x: self.x(),
            y: self.y(),
        }
    }
}

pub trait BoundingBox {
    fn bounds(&self) -> Rect;

    fn envelope_aabb(&self) -> AABB<Point2> {
        let bounds = self.bounds();
        AABB::from_corners(bounds.min, bounds.max)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const ORIGIN: Point2 = Point2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Point2 { x, y }
    }

    pub fn from_angle(angle: f64) -> Self {
        Point2 {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    pub fn dot(&self, other: Point2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z component of the 3D cross product; positive when `other` is to the left.
    pub fn cross(&self, other: Point2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(&self, other: Point2) -> f64 {
        (*self - other).magnitude()
    }

    pub fn distance_2(&self, other: Point2) -> f64 {
        let d = *self - other;
        d.dot(d)
    }

    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn normalized(&self) -> Result<Point2, GeometryError> {
        if !self.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        let length = self.magnitude();
        if length <= f64::EPSILON {
            return Err(GeometryError::ZeroLength);
        }
        Ok(*self / length)
    }

    pub fn set_magnitude(&self, magnitude: f64) -> Result<Point2, GeometryError> {
        Ok(self.normalized()? * magnitude)
    }

    /// Left-hand normal, (x, y) rotated by +90 degrees.
    pub fn perpendicular(&self) -> Point2 {
        Point2 {
            x: -self.y,
            y: self.x,
        }
    }

    pub fn lerp(&self, other: Point2, t: f64) -> Point2 {
        *self + (other - *self) * t
    }

    pub fn midpoint(&self, other: Point2) -> Point2 {
        self.lerp(other, 0.5)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn approx_eq(&self, other: Point2, epsilon: f64) -> bool {
        self.distance(other) <= epsilon
    }
}

impl PointLike for Point2 {
    fn x(&self) -> f64 {
        self.x
    }

    fn y(&self) -> f64 {
        self.y
    }
}

impl From<(f64, f64)> for Point2 {
    fn from((x, y): (f64, f64)) -> Self {
        Point2 { x, y }
    }
}

impl Add for Point2 {
    type Output = Point2;

    fn add(self, other: Point2) -> Point2 {
        Point2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Point2 {
    type Output = Point2;

    fn sub(self, other: Point2) -> Point2 {
        Point2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f64> for Point2 {
    type Output = Point2;

    fn mul(self, scale: f64) -> Point2 {
        Point2 {
            x: self.x * scale,
            y: self.y * scale,
        }
    }
}

impl Div<f64> for Point2 {
    type Output = Point2;

    fn div(self, scale: f64) -> Point2 {
        Point2 {
            x: self.x / scale,
            y: self.y / scale,
        }
    }
}

impl Neg for Point2 {
    type Output = Point2;

    fn neg(self) -> Point2 {
        Point2 {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl rstar::Point for Point2 {
    type Scalar = f64;
    const DIMENSIONS: usize = 2;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        Point2 {
            x: generator(0),
            y: generator(1),
        }
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        match index {
            0 => self.x,
            1 => self.y,
            _ => unreachable!("Point2 has two dimensions"),
        }
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        match index {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => unreachable!("Point2 has two dimensions"),
        }
    }
}

// Dimension-generic vector algebra. Coordinates arriving from the extraction
// collaborators are plain coordinate lists, so these check their lengths.

pub fn vector_add(u: &[f64], v: &[f64]) -> Result<Vec<f64>, GeometryError> {
    same_dimension(u, v)?;
    Ok(u.iter().zip(v).map(|(a, b)| a + b).collect())
}

pub fn vector_sub(u: &[f64], v: &[f64]) -> Result<Vec<f64>, GeometryError> {
    same_dimension(u, v)?;
    Ok(u.iter().zip(v).map(|(a, b)| a - b).collect())
}

pub fn vector_scale(v: &[f64], scale: f64) -> Vec<f64> {
    v.iter().map(|a| a * scale).collect()
}

pub fn vector_magnitude(v: &[f64]) -> f64 {
    v.iter().map(|a| a * a).sum::<f64>().sqrt()
}

pub fn vector_normalize(v: &[f64]) -> Result<Vec<f64>, GeometryError> {
    if v.iter().any(|a| !a.is_finite()) {
        return Err(GeometryError::NonFinite);
    }
    let magnitude = vector_magnitude(v);
    if magnitude <= f64::EPSILON {
        return Err(GeometryError::ZeroLength);
    }
    Ok(vector_scale(v, 1.0 / magnitude))
}

fn same_dimension(u: &[f64], v: &[f64]) -> Result<(), GeometryError> {
    if u.len() != v.len() {
        return Err(GeometryError::DimensionMismatch {
            left: u.len(),
            right: v.len(),
        });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point2,
    pub max: Point2,
}

impl Rect {
    pub fn new(a: Point2, b: Point2) -> Self {
        Rect {
            min: Point2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn from_point(point: Point2) -> Self {
        Rect {
            min: point,
            max: point,
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2>) -> Option<Rect> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        Some(points.fold(Rect::from_point(first), |rect, p| rect.including(*p)))
    }

    pub fn including(&self, point: Point2) -> Rect {
        Rect {
            min: Point2::new(self.min.x.min(point.x), self.min.y.min(point.y)),
            max: Point2::new(self.max.x.max(point.x), self.max.y.max(point.y)),
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        self.including(other.min).including(other.max)
    }

    pub fn expanded(&self, margin: f64) -> Rect {
        Rect {
            min: Point2::new(self.min.x - margin, self.min.y - margin),
            max: Point2::new(self.max.x + margin, self.max.y + margin),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point2 {
        self.min.midpoint(self.max)
    }

    pub fn diagonal(&self) -> f64 {
        self.min.distance(self.max)
    }

    pub fn contains(&self, point: Point2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x && self.min.y <= other.max.y && self.max.y >= other.min.y
    }
}

impl BoundingBox for Rect {
    fn bounds(&self) -> Rect {
        *self
    }
}
