//! Band around a routed path. Cross location 0 is the left boundary, 1 the right.

use serde::Serialize;

use crate::error::GeometryError;
use crate::geometry::{BezierSegment, Point2};
use crate::routing::types::RoutedPath;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScaffoldNode {
    pub position: Point2,
    /// Derivative from the left boundary towards the right one.
    pub across: Point2,
    pub along: Point2,
}

impl ScaffoldNode {
    fn blend(&self, other: &ScaffoldNode, location: f64) -> (Point2, Point2) {
        (
            self.position + self.across * location,
            self.along.lerp(other.along, location),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScaffoldElement {
    pub left_start: ScaffoldNode,
    pub right_start: ScaffoldNode,
    pub left_end: ScaffoldNode,
    pub right_end: ScaffoldNode,
}

impl ScaffoldElement {
    fn from_segment(segment: &BezierSegment, half_width: f64) -> Result<Self, GeometryError> {
        let left = segment.offset(half_width)?;
        let right = segment.offset(-half_width)?;
        let start_across = right.p0 - left.p0;
        let end_across = right.p3 - left.p3;
        let start_along = |curve: &BezierSegment| (curve.p1 - curve.p0) * 3.0;
        let end_along = |curve: &BezierSegment| (curve.p3 - curve.p2) * 3.0;
        Ok(ScaffoldElement {
            left_start: ScaffoldNode {
                position: left.p0,
                across: start_across,
                along: start_along(&left),
            },
            right_start: ScaffoldNode {
                position: right.p0,
                across: start_across,
                along: start_along(&right),
            },
            left_end: ScaffoldNode {
                position: left.p3,
                across: end_across,
                along: end_along(&left),
            },
            right_end: ScaffoldNode {
                position: right.p3,
                across: end_across,
                along: end_along(&right),
            },
        })
    }

    /// Hermite curve at `location` across the element, back in bezier form.
    pub fn evaluate(&self, location: f64) -> BezierSegment {
        let (p1, d1) = self.left_start.blend(&self.right_start, location);
        let (p2, d2) = self.left_end.blend(&self.right_end, location);
        BezierSegment::new(p1, p1 + d1 / 3.0, p2 - d2 / 3.0, p2)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Scaffold2d {
    half_width: f64,
    elements: Vec<ScaffoldElement>,
}

impl Scaffold2d {
    /// Band of total width `2 * half_width` centred on `path`.
    pub fn from_path(path: &RoutedPath, half_width: f64) -> Result<Self, GeometryError> {
        Scaffold2d::from_segments(&path.segments, half_width)
    }

    pub fn from_segments(segments: &[BezierSegment], half_width: f64) -> Result<Self, GeometryError> {
        if !half_width.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        if segments.is_empty() {
            return Err(GeometryError::EmptyInput);
        }
        let elements = segments
            .iter()
            .map(|segment| ScaffoldElement::from_segment(segment, half_width))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Scaffold2d { half_width, elements })
    }

    pub fn half_width(&self) -> f64 {
        self.half_width
    }

    pub fn elements(&self) -> &[ScaffoldElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The curve at `location` across the band, clamped to `[0, 1]`.
    pub fn evaluate(&self, location: f64) -> Result<Vec<BezierSegment>, GeometryError> {
        if !location.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        let location = location.clamp(0.0, 1.0);
        Ok(self.elements.iter().map(|element| element.evaluate(location)).collect())
    }

    /// `count` curves spread evenly across the band, left to right, each in
    /// the middle of its own slot.
    pub fn lane_curves(&self, count: usize) -> Vec<Vec<BezierSegment>> {
        (0..count)
            .map(|lane| {
                let location = (lane as f64 + 0.5) / count as f64;
                self.elements.iter().map(|element| element.evaluate(location)).collect()
            })
            .collect()
    }
}
