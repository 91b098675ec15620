use std::f64::consts::{FRAC_PI_2, TAU};

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

use super::arc::arc_to_bezier_with_tolerance;
use super::{BezierSegment, Point2};

pub const CUFF_BASE_RADIUS: f64 = 5000.0;
pub const JUNCTION_DOT_SCALE: f64 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dash {
    pub start: Point2,
    pub end: Point2,
}

/// Dashed circle marking a nerve cuff. The radius grows logarithmically with
/// the number of paths running through the cuff.
pub fn cuff_circle(center: Point2, path_num: usize, num_dashes: usize, dash_ratio: f64) -> Vec<Dash> {
    let radius = CUFF_BASE_RADIUS * (1.0 + (path_num as f64 + 1.0).ln());
    let num_dashes = num_dashes.max(1);
    let step = TAU / num_dashes as f64;
    let dash_ratio = dash_ratio.clamp(0.0, 1.0);
    (0..num_dashes)
        .map(|i| {
            let start_angle = step * i as f64;
            let end_angle = start_angle + step * dash_ratio;
            Dash {
                start: center + Point2::from_angle(start_angle) * radius,
                end: center + Point2::from_angle(end_angle) * radius,
            }
        })
        .collect()
}

/// Triangle pointing along `heading` with its base centred on `back`.
pub fn arrow_head(back: Point2, heading: f64, length: f64) -> [Point2; 3] {
    let tip = back + Point2::from_angle(heading) * length;
    let offset = Point2::from_angle(heading + FRAC_PI_2) * (length / 3.0);
    [tip, back + offset, back - offset]
}

/// Circle drawn where paths meet, sized from the lane separation.
/// `tolerance` is the radial error allowed, relative to the radius.
pub fn junction_dot(center: Point2, separation: f64, tolerance: f64) -> Result<Vec<BezierSegment>, GeometryError> {
    arc_to_bezier_with_tolerance(center, JUNCTION_DOT_SCALE * separation, 0.0, TAU, tolerance)
}
